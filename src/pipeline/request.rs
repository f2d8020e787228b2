//! Request bodies for job submission.
//!
//! Every body starts as `{"assetID": <live handle>}` and receives the step's
//! own parameters on top. A few operations additionally take values from the
//! run-level options; those are applied last, and only when supplied.

use crate::config::RunOptions;
use crate::output::AssetHandle;
use crate::sequence::{OperationStep, PROTECT_PDF};
use serde_json::{Map, Value};

/// Build the JSON body for one step.
pub fn build_request_body(asset: &AssetHandle, step: &OperationStep, options: &RunOptions) -> Value {
    let mut body = Map::new();
    body.insert("assetID".to_string(), Value::String(asset.0.clone()));
    for (key, value) in &step.parameters {
        body.insert(key.clone(), value.clone());
    }

    if step.operation == PROTECT_PDF {
        inject_protection(&mut body, options);
    }

    Value::Object(body)
}

/// Merge passwords into `passwordProtection` and replace `permissions`.
fn inject_protection(body: &mut Map<String, Value>, options: &RunOptions) {
    let passwords = [
        ("ownerPassword", options.owner_password()),
        ("userPassword", options.user_password()),
    ];
    for (key, value) in passwords {
        let Some(value) = value else { continue };
        let protection = body
            .entry("passwordProtection")
            .or_insert_with(|| Value::Object(Map::new()));
        if !protection.is_object() {
            *protection = Value::Object(Map::new());
        }
        if let Value::Object(map) = protection {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    if let Some(permissions) = options.permissions() {
        body.insert(
            "permissions".to_string(),
            Value::Array(permissions.into_iter().map(Value::String).collect()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle() -> AssetHandle {
        AssetHandle("urn:aaid:AS:UE1:abc".into())
    }

    #[test]
    fn body_carries_handle_and_step_parameters() {
        let step = OperationStep::new("ocrpdf").with_parameter("ocrLang", json!("de-DE"));
        let body = build_request_body(&handle(), &step, &RunOptions::default());
        assert_eq!(
            body,
            json!({"assetID": "urn:aaid:AS:UE1:abc", "ocrLang": "de-DE"})
        );
    }

    #[test]
    fn run_options_ignored_for_other_operations() {
        let opts = RunOptions::parse(["userPassword=pw"]);
        let body = build_request_body(&handle(), &OperationStep::new("compresspdf"), &opts);
        assert!(body.get("passwordProtection").is_none());
    }

    #[test]
    fn protect_merges_into_existing_password_object() {
        let step = OperationStep::new("protectpdf")
            .with_parameter("passwordProtection", json!({"userPassword": "from-step"}))
            .with_parameter("encryptionAlgorithm", json!("AES_256"));
        let opts = RunOptions::parse(["ownerPassword=owner"]);
        let body = build_request_body(&handle(), &step, &opts);
        assert_eq!(
            body["passwordProtection"],
            json!({"userPassword": "from-step", "ownerPassword": "owner"})
        );
        assert_eq!(body["encryptionAlgorithm"], json!("AES_256"));
    }

    #[test]
    fn protect_run_option_overrides_step_password() {
        let step = OperationStep::new("protectpdf")
            .with_parameter("passwordProtection", json!({"userPassword": "from-step"}));
        let opts = RunOptions::parse(["userPassword=from-cli"]);
        let body = build_request_body(&handle(), &step, &opts);
        assert_eq!(body["passwordProtection"]["userPassword"], json!("from-cli"));
    }

    #[test]
    fn protect_permissions_replace_list() {
        let step = OperationStep::new("protectpdf")
            .with_parameter("permissions", json!(["PRINT_HIGH_QUALITY"]));
        let opts = RunOptions::parse(["permissions=PRINT_LOW_QUALITY,COPY_CONTENT"]);
        let body = build_request_body(&handle(), &step, &opts);
        assert_eq!(body["permissions"], json!(["PRINT_LOW_QUALITY", "COPY_CONTENT"]));
    }

    #[test]
    fn protect_without_run_options_is_untouched() {
        let step = OperationStep::new("protectpdf");
        let body = build_request_body(&handle(), &step, &RunOptions::default());
        assert_eq!(body, json!({"assetID": "urn:aaid:AS:UE1:abc"}));
    }
}
