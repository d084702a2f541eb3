// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

mod digest;
pub mod oci;

pub use self::digest::Digest;

use serde::de::{Error, IgnoredAny};
use serde::Deserialize;

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";

/// The only layer media type written to the device
pub const LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

/// Media types sent in the `Accept` header of manifest requests
pub const ACCEPT: &[&str] = &[OCI_MANIFEST, OCI_INDEX, DOCKER_MANIFEST, DOCKER_MANIFEST_LIST];

/// Whether a config blob of this media type describes a runnable image
pub fn is_image_config(media_type: &str) -> bool {
    media_type == OCI_CONFIG || media_type == DOCKER_CONFIG
}

/// A document served from the `manifests/` endpoint
#[derive(Clone, Debug)]
pub enum Document {
    Manifest(oci::Manifest),
    Index(oci::Index),
}

impl Document {
    /// Parses a manifest or index
    ///
    /// The `mediaType` field of the document wins over the `Content-Type`
    /// the registry sent. Without either, the presence of a `manifests`
    /// array marks an index.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(rename = "mediaType")]
            media_type: Option<String>,

            manifests: Option<IgnoredAny>,
        }

        let probe: Probe = serde_json::from_slice(body)?;
        let media_type = probe
            .media_type
            .as_deref()
            .or_else(|| content_type.map(|c| c.split(';').next().unwrap_or(c).trim()));

        match media_type {
            Some(OCI_INDEX) | Some(DOCKER_MANIFEST_LIST) => {
                Ok(Self::Index(serde_json::from_slice(body)?))
            }

            Some(OCI_MANIFEST) | Some(DOCKER_MANIFEST) => {
                Ok(Self::Manifest(serde_json::from_slice(body)?))
            }

            None | Some("application/json") if probe.manifests.is_some() => {
                Ok(Self::Index(serde_json::from_slice(body)?))
            }

            None | Some("application/json") => Ok(Self::Manifest(serde_json::from_slice(body)?)),

            Some(other) => Err(serde_json::Error::custom(format!(
                "unsupported manifest media type {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CONFIG: &str = r#"{
        "mediaType": "application/vnd.oci.empty.v1+json",
        "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
        "size": 2
    }"#;

    #[test]
    fn manifest_by_field() {
        let body = format!(
            r#"{{"schemaVersion":2,"mediaType":"{}","config":{},"layers":[]}}"#,
            OCI_MANIFEST, CONFIG
        );

        let doc = Document::parse(Some("text/plain"), body.as_bytes()).unwrap();
        assert!(matches!(doc, Document::Manifest(..)));
    }

    #[test]
    fn manifest_by_header() {
        let body = format!(r#"{{"schemaVersion":2,"config":{},"layers":[]}}"#, CONFIG);
        let header = format!("{}; charset=utf-8", DOCKER_MANIFEST);

        let doc = Document::parse(Some(&header), body.as_bytes()).unwrap();
        assert!(matches!(doc, Document::Manifest(..)));
    }

    #[test]
    fn index_by_shape() {
        let body = r#"{"schemaVersion":2,"manifests":[]}"#;
        let doc = Document::parse(None, body.as_bytes()).unwrap();
        assert!(matches!(doc, Document::Index(..)));
    }

    #[test]
    fn rejects() {
        assert!(Document::parse(None, b"not json").is_err());
        assert!(Document::parse(None, br#"{"schemaVersion":2}"#).is_err());

        let body = r#"{
            "schemaVersion": 1,
            "mediaType": "application/vnd.docker.distribution.manifest.v1+json"
        }"#;
        let err = Document::parse(None, body.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unsupported manifest media type"));
    }
}
