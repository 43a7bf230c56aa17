// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured-output contract enforcement: parsing a provider's raw JSON
//! response into a [`TurnOutput`] only once it has validated against the
//! generated schema.

use crate::ProviderError;
use schemars::schema_for;
use std::sync::OnceLock;
use wa_contracts::{PromptPack, TurnOutput};

fn schema_value() -> &'static serde_json::Value {
    static SCHEMA: OnceLock<serde_json::Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        serde_json::to_value(schema_for!(TurnOutput)).expect("TurnOutput schema always serializes")
    })
}

fn prompt_pack_schema_value() -> &'static serde_json::Value {
    static SCHEMA: OnceLock<serde_json::Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        serde_json::to_value(schema_for!(PromptPack)).expect("PromptPack schema always serializes")
    })
}

/// Parse `raw` as a [`PromptPack`], validating against the generated schema
/// first, matching [`parse_turn_output`]'s contract.
///
/// # Errors
///
/// Returns [`ProviderError::SchemaViolation`] if `raw` is not valid JSON, or
/// does not satisfy the `PromptPack` schema.
pub fn parse_prompt_pack(raw: &str) -> Result<PromptPack, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ProviderError::SchemaViolation(format!("invalid JSON: {e}")))?;

    let validator = jsonschema::validator_for(prompt_pack_schema_value())
        .map_err(|e| ProviderError::SchemaViolation(format!("schema failed to compile: {e}")))?;

    if let Some(first) = validator.iter_errors(&value).next() {
        return Err(ProviderError::SchemaViolation(first.to_string()));
    }

    serde_json::from_value(value)
        .map_err(|e| ProviderError::SchemaViolation(format!("schema-valid but unparseable: {e}")))
}

/// Parse `raw` as a [`TurnOutput`], first validating it against the
/// generated JSON Schema so malformed provider output surfaces as
/// [`ProviderError::SchemaViolation`] rather than a silent structural
/// mismatch.
///
/// # Errors
///
/// Returns [`ProviderError::SchemaViolation`] if `raw` is not valid JSON, or
/// does not satisfy the TurnOutput schema.
pub fn parse_turn_output(raw: &str) -> Result<TurnOutput, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ProviderError::SchemaViolation(format!("invalid JSON: {e}")))?;

    let validator = jsonschema::validator_for(schema_value())
        .map_err(|e| ProviderError::SchemaViolation(format!("schema failed to compile: {e}")))?;

    if let Some(first) = validator.iter_errors(&value).next() {
        return Err(ProviderError::SchemaViolation(first.to_string()));
    }

    serde_json::from_value(value)
        .map_err(|e| ProviderError::SchemaViolation(format!("schema-valid but unparseable: {e}")))
}
