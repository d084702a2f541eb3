// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use std::collections::HashMap;
use std::fmt::Display;

use serde::Deserialize;

use super::Digest;

/// Annotation carrying the human-readable title of a blob
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Platform {
    pub architecture: String,

    pub os: String,

    #[serde(rename = "os.version")]
    pub os_version: Option<String>,

    #[serde(default, rename = "os.features")]
    pub os_features: Vec<String>,

    pub variant: Option<String>,
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }

        Ok(())
    }
}

impl Platform {
    pub fn new(os: &str, architecture: &str) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            ..Default::default()
        }
    }

    /// The platform of the running host, named the way registries name it
    pub fn current() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "powerpc64" => "ppc64le",
            other => other,
        };

        Self::new("linux", arch)
    }

    /// Whether `other` can run here. Only os and architecture are compared.
    pub fn matches(&self, other: &Platform) -> bool {
        self.os == other.os && self.architecture == other.architecture
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,

    pub digest: Digest,

    pub size: u64,

    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default)]
    pub annotations: HashMap<String, String>,

    pub platform: Option<Platform>,
}

impl Descriptor {
    /// The `org.opencontainers.image.title` annotation, if present
    pub fn title(&self) -> Option<&str> {
        self.annotations.get(ANNOTATION_TITLE).map(String::as_str)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: usize,

    #[serde(rename = "mediaType")]
    pub media_type: Option<String>,

    pub config: Descriptor,

    #[serde(default)]
    pub layers: Vec<Descriptor>,

    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// An OCI image index or a Docker manifest list
#[derive(Clone, Debug, Deserialize)]
pub struct Index {
    #[serde(rename = "schemaVersion")]
    pub schema_version: usize,

    #[serde(rename = "mediaType")]
    pub media_type: Option<String>,

    pub manifests: Vec<Descriptor>,
}

impl Index {
    /// Finds the first manifest built for `platform`
    pub fn select(&self, platform: &Platform) -> Option<&Descriptor> {
        self.manifests.iter().find(|m| match &m.platform {
            Some(p) => platform.matches(p),
            None => false,
        })
    }
}

/// The subset of an image configuration needed to check its platform
#[derive(Clone, Debug, Deserialize)]
pub struct ImageConfig {
    pub architecture: String,

    pub os: String,

    pub variant: Option<String>,
}

impl ImageConfig {
    pub fn platform(&self) -> Platform {
        Platform {
            variant: self.variant.clone(),
            ..Platform::new(&self.os, &self.architecture)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MANIFEST: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.unknown.config.v1+json",
            "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
            "size": 2
        },
        "layers": [
            {
                "mediaType": "application/vnd.oci.image.layer.v1.tar",
                "digest": "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4",
                "size": 1024,
                "annotations": {
                    "org.opencontainers.image.title": "disk.raw.gz"
                }
            },
            {
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": "sha256:b5b2b2c507a0944348e0303114d8d93aaaa081732b86451d9bce1f432a537bc7",
                "size": 32
            }
        ]
    }"#;

    const INDEX: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4",
                "size": 512,
                "platform": { "architecture": "arm64", "os": "linux", "variant": "v8" }
            },
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:b5b2b2c507a0944348e0303114d8d93aaaa081732b86451d9bce1f432a537bc7",
                "size": 512,
                "platform": { "architecture": "amd64", "os": "linux" }
            },
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
                "size": 512
            }
        ]
    }"#;

    #[test]
    fn manifest() {
        let manifest: Manifest = serde_json::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.schema_version, 2);
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(manifest.layers[0].title(), Some("disk.raw.gz"));
        assert_eq!(manifest.layers[0].size, 1024);
        assert_eq!(manifest.layers[1].title(), None);
    }

    #[test]
    fn select() {
        let index: Index = serde_json::from_str(INDEX).unwrap();

        let amd64 = index.select(&Platform::new("linux", "amd64")).unwrap();
        assert!(amd64.digest.to_string().starts_with("sha256:b5b2"));

        let arm64 = index.select(&Platform::new("linux", "arm64")).unwrap();
        assert!(arm64.digest.to_string().starts_with("sha256:a3ed"));

        assert!(index.select(&Platform::new("linux", "s390x")).is_none());
        assert!(index.select(&Platform::new("windows", "amd64")).is_none());
    }

    #[test]
    fn platform() {
        let current = Platform::current();
        assert_eq!(current.os, "linux");
        assert_ne!(current.architecture, "x86_64");
        assert_ne!(current.architecture, "aarch64");

        let config: ImageConfig =
            serde_json::from_str(r#"{"architecture":"arm","os":"linux","variant":"v7"}"#).unwrap();
        assert_eq!(config.platform().to_string(), "linux/arm/v7");
        assert!(Platform::new("linux", "arm").matches(&config.platform()));
    }
}
