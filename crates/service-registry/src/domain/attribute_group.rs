//! # Attribute Groups
//!
//! A credential schema together with the attributes a verifier asks the
//! prover to disclose from it. Each group drives one verification sub-flow
//! and fills one key of the service record.

use serde::Serialize;
use std::collections::BTreeMap;

/// Schema key for the car registration credential.
pub const CAR_REGISTRATION_SCHEMA: &str = "car-registration";

/// Schema key for the car type credential.
pub const CAR_TYPE_SCHEMA: &str = "car-type";

/// Schema key for the holder's name, checked before a stream is served.
pub const IDENTITY_SCHEMA: &str = "identity";

/// Issuer whose credentials are accepted unless configured otherwise.
pub const DEFAULT_TRUSTED_ISSUER: &str = "NB5Rjw6kpkMcwmcUQeLhKt";

/// Only credentials issued by this DID satisfy the attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Restriction {
    pub issuer_did: String,
}

/// One requested attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSpec {
    pub name: String,
    pub restrictions: Vec<Restriction>,
}

impl AttributeSpec {
    pub fn issued_by(name: impl Into<String>, issuer_did: &str) -> Self {
        Self {
            name: name.into(),
            restrictions: vec![Restriction {
                issuer_did: issuer_did.to_string(),
            }],
        }
    }
}

/// Attributes requested from one credential schema, keyed by referent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeGroup {
    /// Record key the verified value is stored under.
    pub schema: String,
    pub attributes: BTreeMap<String, AttributeSpec>,
}

impl AttributeGroup {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add a requested attribute under `referent`.
    pub fn with_attribute(mut self, referent: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attributes.insert(referent.into(), spec);
        self
    }

    /// The registration number of a car.
    pub fn car_registration(issuer_did: &str) -> Self {
        Self::new(CAR_REGISTRATION_SCHEMA).with_attribute(
            "0_car_registration",
            AttributeSpec::issued_by("registration", issuer_did),
        )
    }

    /// Make, model and year of a car.
    pub fn car_type(issuer_did: &str) -> Self {
        Self::new(CAR_TYPE_SCHEMA)
            .with_attribute("0_car_make", AttributeSpec::issued_by("make", issuer_did))
            .with_attribute("0_car_model", AttributeSpec::issued_by("model", issuer_did))
            .with_attribute("0_car_year", AttributeSpec::issued_by("year", issuer_did))
    }

    /// First and last name of the holder.
    pub fn identity(issuer_did: &str) -> Self {
        Self::new(IDENTITY_SCHEMA)
            .with_attribute("1_first_name", AttributeSpec::issued_by("first_name", issuer_did))
            .with_attribute("2_last_name", AttributeSpec::issued_by("last_name", issuer_did))
    }

    /// Requested referents, in sorted order.
    pub fn referents(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }
}

/// An indy proof request built from an [`AttributeGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProofRequest {
    /// Group this request was built from. Not part of the wire form.
    #[serde(skip_serializing)]
    pub schema: String,
    pub name: String,
    pub version: String,
    pub requested_attributes: BTreeMap<String, AttributeSpec>,
    pub requested_predicates: BTreeMap<String, serde_json::Value>,
    pub nonce: String,
}

impl ProofRequest {
    /// Request every attribute of `group` under a fresh random nonce.
    pub fn for_group(group: &AttributeGroup) -> Self {
        Self {
            schema: group.schema.clone(),
            name: "Proof of Identity".to_string(),
            version: "1.0".to_string(),
            requested_attributes: group.attributes.clone(),
            requested_predicates: BTreeMap::new(),
            nonce: random_nonce(),
        }
    }
}

/// Decimal rendering of 80 random bits.
fn random_nonce() -> String {
    let bits: u128 = rand::random::<u128>() >> 48;
    bits.to_string()
}
