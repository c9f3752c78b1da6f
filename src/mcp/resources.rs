//! Read-only resources: configuration status and usage examples.

use crate::backends::BackendFactory;
use crate::storage::StorageService;
use serde_json::{json, Value};

pub const CONFIG_URI: &str = "storage://config";
pub const EXAMPLES_URI: &str = "storage://examples";

const EXAMPLES: &str = r#"# Cloud Storage Usage

## upload_file

```json
{
  "fileData": "aGVsbG8gd29ybGQ=",
  "filename": "report.pdf",
  "contentType": "application/pdf",
  "metadata": { "uploadedBy": "user123" }
}
```

`contentType` is optional; when omitted it is inferred from the file extension.
The result carries the public `url` and the `objectKey`.

## delete_file

```json
{ "url": "https://my-bucket.s3.us-east-1.amazonaws.com/uploads/2024-01-01/8f3c.pdf" }
```

A bare object key is accepted as well. Deleting an object that no longer exists succeeds.

## get_download_url

```json
{ "key": "uploads/2024-01-01/8f3c.pdf", "expirationTime": 600 }
```

## Selecting a backend

Set `CLOUD_STORAGE_BACKEND` to `aws-s3`, `qiniu` or `alibaba-oss` and provide the
matching credentials:

```bash
# AWS S3 or an S3 compatible store
export AWS_ACCESS_KEY_ID=...
export AWS_SECRET_ACCESS_KEY=...
export AWS_REGION=us-east-1
export AWS_S3_BUCKET=my-bucket

# Qiniu Kodo
export QINIU_ACCESS_KEY=...
export QINIU_SECRET_KEY=...
export QINIU_BUCKET=my-bucket
export QINIU_DOMAIN=files.example.com
export QINIU_ZONE=z0

# Alibaba Cloud OSS
export ALIBABA_ACCESS_KEY_ID=...
export ALIBABA_ACCESS_KEY_SECRET=...
export ALIBABA_OSS_BUCKET=my-bucket
export ALIBABA_OSS_REGION=oss-cn-hangzhou
```

Alternatively pass `--config storage.json` or set `CONFIG_FILE`.
"#;

pub fn list_resources() -> Vec<Value> {
    vec![
        json!({
            "uri": CONFIG_URI,
            "name": "storage-config",
            "title": "Storage Configuration",
            "description": "Current cloud storage configuration and status",
            "mimeType": "application/json"
        }),
        json!({
            "uri": EXAMPLES_URI,
            "name": "usage-examples",
            "title": "Usage Examples",
            "description": "Examples of how to use the cloud storage tools",
            "mimeType": "text/markdown"
        }),
    ]
}

/// `resources/read` contents for `uri`, or `None` when no such resource exists.
pub fn read_resource(uri: &str, storage: Option<&StorageService>) -> Option<Value> {
    let (text, mime_type) = match uri {
        CONFIG_URI => (config_status(storage).to_string(), "application/json"),
        EXAMPLES_URI => (EXAMPLES.to_string(), "text/markdown"),
        _ => return None,
    };

    Some(json!({
        "contents": [{ "uri": uri, "mimeType": mime_type, "text": text }]
    }))
}

fn config_status(storage: Option<&StorageService>) -> Value {
    let not_configured = || json!({ "error": "Not configured" });
    json!({
        "configured": storage.is_some(),
        "backend": storage.map_or_else(not_configured, |s| json!(s.backend_info())),
        "config": storage.map_or_else(not_configured, |s| json!(s.config_summary())),
        "supportedBackends": BackendFactory::supported_backends(),
    })
}
