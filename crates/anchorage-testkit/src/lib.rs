//! # Anchorage Testkit
//!
//! Testing utilities for Anchorage.
//!
//! - **Golden vectors**: canonical encodings and digests that must never change
//! - **Generators**: proptest strategies for sensor payloads and device keys
//! - **Fixtures**: test devices and a fully in-memory pipeline
//!
//! ## Golden Vectors
//!
//! ```rust
//! use anchorage_testkit::vectors::{all_vectors, verify_all_vectors};
//!
//! for vector in all_vectors() {
//!     println!("{}: {}", vector.name, vector.expected_canonical);
//! }
//! assert!(verify_all_vectors().is_ok());
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use anchorage_testkit::fixtures::{PipelineFixture, TestDevice};
//!
//! let fixture = PipelineFixture::new();
//! let device = TestDevice::with_seed("IOT-AB12CD34", [7; 32]);
//! fixture.enroll(&device).await;
//! let result = fixture.pipeline.submit(&device.id, &data, &device.sign(&data)).await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    fast_settings, object, reference_payload, CountingContentStore, PipelineFixture, TestDevice,
    TestPipeline,
};
pub use generators::{device_keypair, reordered_pair, sensor_data};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
