//! Golden vectors for the canonical encoding.
//!
//! Devices in the field sign these exact bytes. If any vector stops
//! matching, previously issued signatures and anchored hashes no longer
//! verify.

use anchorage_core::{canonical_string, payload_digest, SensorData};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    pub name: &'static str,
    /// Payload as a device might send it (key order arbitrary).
    pub input: &'static str,
    pub expected_canonical: &'static str,
    /// SHA-256 of `expected_canonical`, lowercase hex.
    pub expected_digest: &'static str,
}

impl GoldenVector {
    /// Parse `input` into a payload.
    ///
    /// # Panics
    ///
    /// If `input` is not a JSON object.
    pub fn payload(&self) -> SensorData {
        serde_json::from_str(self.input).expect("golden vector input is a JSON object")
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "reference climate reading",
            input: r#"{"temperature": 22.5, "humidity": 60, "timestamp": 1716000000}"#,
            expected_canonical: r#"{"humidity":60,"temperature":22.5,"timestamp":1716000000}"#,
            expected_digest: "41334babe2a7ff4e3617a9747eec88394fdbc104370d9c5468292f93fd5afb40",
        },
        GoldenVector {
            name: "empty payload",
            input: "{ }",
            expected_canonical: "{}",
            expected_digest: "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
        },
        GoldenVector {
            name: "nested object and array",
            input: r#"{"sensor": "BME280", "readings": [21.5, 21.75, 22],
                       "location": {"lon": -122.3321, "lat": 47.6062}}"#,
            expected_canonical: r#"{"location":{"lat":47.6062,"lon":-122.3321},"readings":[21.5,21.75,22],"sensor":"BME280"}"#,
            expected_digest: "fa9ad2d9a01bc05578ef90a67afb6136f575b2789d26bcb799df544fa325feeb",
        },
        GoldenVector {
            name: "booleans and null",
            input: r#"{"pressure_hpa": 1013, "error": null, "battery_low": false}"#,
            expected_canonical: r#"{"battery_low":false,"error":null,"pressure_hpa":1013}"#,
            expected_digest: "9b6adefdb4e47aa9367f5faa65eb4efaeac3b28b389a94252315ceed0a01b7a8",
        },
        GoldenVector {
            name: "uppercase keys sort first",
            input: r#"{"b": 4, "a": 3, "B": 2, "A": 1}"#,
            expected_canonical: r#"{"A":1,"B":2,"a":3,"b":4}"#,
            expected_digest: "c3086418bf4cdf378f1b5edaa0482bc67ea36f6333eaa368a0aa83634136026d",
        },
    ]
}

/// Check every vector, returning the name of the first mismatch.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let data = vector.payload();
        if canonical_string(&data) != vector.expected_canonical {
            return Err(format!("{}: canonical form changed", vector.name));
        }
        if payload_digest(&data).to_hex() != vector.expected_digest {
            return Err(format!("{}: digest changed", vector.name));
        }
    }
    Ok(())
}
