// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use super::{Error, Layer, Repository};
use crate::formats::oci::{Descriptor, ImageConfig, Manifest, Platform};
use crate::formats::{self, Digest, Document};

use std::fmt::Display;

use log::debug;

/// A reference resolved to a single manifest for one platform
#[derive(Clone, Debug)]
pub struct Resolved {
    repo: Repository,
    reference: String,
    fetched: Option<(Option<String>, Vec<u8>)>,
}

impl Display for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repo, self.reference)
    }
}

/// What the document behind a tag asks for next
#[derive(Debug, PartialEq, Eq)]
enum Decision {
    /// Fetch this entry of an index
    Select(Digest),

    /// Keep the document and parse it as the manifest
    Keep,
}

/// Decides how to continue from the document a tag points at
///
/// `config` is only consulted for a manifest whose config is an image
/// config. A document that fails to parse is kept, so the error surfaces
/// when the manifest is parsed for real.
fn decide<F>(
    document: Result<Document, serde_json::Error>,
    platform: &Platform,
    config: F,
) -> Result<Decision, Error>
where
    F: FnOnce(&Descriptor) -> Result<ImageConfig, Error>,
{
    match document {
        Ok(Document::Index(index)) => index
            .select(platform)
            .map(|entry| Decision::Select(entry.digest.clone()))
            .ok_or_else(|| Error::Platform(platform.clone())),

        Ok(Document::Manifest(manifest)) => {
            if !formats::is_image_config(&manifest.config.media_type) {
                debug!("config {} has no platform, skipping check", manifest.config.media_type);
                return Ok(Decision::Keep);
            }

            let found = config(&manifest.config)?.platform();
            if !platform.matches(&found) {
                return Err(Error::PlatformMismatch {
                    found,
                    wanted: platform.clone(),
                });
            }

            Ok(Decision::Keep)
        }

        Err(..) => Ok(Decision::Keep),
    }
}

impl Resolved {
    pub(super) fn new(repo: Repository, tag: &str, platform: &Platform) -> Result<Self, Error> {
        let (content_type, body) = repo.manifest(tag)?;

        let document = Document::parse(content_type.as_deref(), &body);
        let decision = decide(document, platform, |config| {
            Ok(repo.blob(&config.digest.to_string())?.into_json()?)
        })?;

        Ok(match decision {
            Decision::Select(digest) => {
                debug!("{} selected {} for {}", tag, digest, platform);
                Self {
                    reference: digest.to_string(),
                    fetched: None,
                    repo,
                }
            }

            Decision::Keep => Self {
                reference: tag.into(),
                fetched: Some((content_type, body)),
                repo,
            },
        })
    }

    /// The raw manifest body and its `Content-Type`
    pub fn fetch(self) -> Result<Fetched, Error> {
        let (content_type, body) = match self.fetched {
            Some(x) => x,
            None => self.repo.manifest(&self.reference)?,
        };

        Ok(Fetched {
            repo: self.repo,
            reference: self.reference,
            content_type,
            body,
        })
    }
}

/// A manifest body that has not been parsed yet
#[derive(Clone, Debug)]
pub struct Fetched {
    repo: Repository,
    reference: String,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl Fetched {
    pub fn parse(self) -> Result<Image, serde_json::Error> {
        let manifest = match Document::parse(self.content_type.as_deref(), &self.body)? {
            Document::Manifest(manifest) => manifest,
            Document::Index(..) => {
                return Err(serde::de::Error::custom("expected an image manifest, found an index"))
            }
        };

        Ok(Image {
            repo: self.repo,
            reference: self.reference,
            manifest,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Image {
    repo: Repository,
    reference: String,
    manifest: Manifest,
}

impl Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repo, self.reference)
    }
}

impl Image {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn layer(&self, descriptor: &Descriptor) -> Layer {
        Layer::new(self.repo.clone(), descriptor.clone())
    }
}

#[cfg(test)]
mod test {
    use super::{decide, Decision, Fetched, Resolved};
    use crate::api::{Error, Repository};
    use crate::formats::oci::{Descriptor, ImageConfig, Platform};
    use crate::formats::{Document, OCI_CONFIG, OCI_INDEX, OCI_MANIFEST};

    const ARM64: &str = "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4";
    const AMD64: &str = "sha256:b5b2b2c507a0944348e0303114d8d93aaaa081732b86451d9bce1f432a537bc7";
    const CONFIG: &str = "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a";

    fn index() -> String {
        format!(
            r#"{{
                "schemaVersion": 2,
                "mediaType": "{}",
                "manifests": [
                    {{
                        "mediaType": "{}",
                        "digest": "{}",
                        "size": 512,
                        "platform": {{ "architecture": "arm64", "os": "linux" }}
                    }},
                    {{
                        "mediaType": "{}",
                        "digest": "{}",
                        "size": 512,
                        "platform": {{ "architecture": "amd64", "os": "linux" }}
                    }}
                ]
            }}"#,
            OCI_INDEX, OCI_MANIFEST, ARM64, OCI_MANIFEST, AMD64
        )
    }

    fn manifest(config: &str) -> String {
        format!(
            r#"{{
                "schemaVersion": 2,
                "mediaType": "{}",
                "config": {{ "mediaType": "{}", "digest": "{}", "size": 2 }},
                "layers": [
                    {{
                        "mediaType": "application/vnd.oci.image.layer.v1.tar",
                        "digest": "{}",
                        "size": 1024,
                        "annotations": {{ "org.opencontainers.image.title": "disk.raw.gz" }}
                    }}
                ]
            }}"#,
            OCI_MANIFEST, config, CONFIG, AMD64
        )
    }

    fn document(body: &str) -> Result<Document, serde_json::Error> {
        Document::parse(None, body.as_bytes())
    }

    fn built_for(arch: &str) -> ImageConfig {
        serde_json::from_str(&format!(r#"{{"architecture":"{}","os":"linux"}}"#, arch)).unwrap()
    }

    fn no_lookup(_: &Descriptor) -> Result<ImageConfig, Error> {
        panic!("config lookup not expected")
    }

    fn fetched(body: &str) -> Fetched {
        let (repo, tag) = Repository::new("ghcr.io/acme/disk:v1").unwrap();
        Fetched {
            repo,
            reference: tag.into(),
            content_type: None,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn index_selects_platform() {
        let amd64 = Platform::new("linux", "amd64");
        let decision = decide(document(&index()), &amd64, no_lookup).unwrap();
        assert_eq!(decision, Decision::Select(AMD64.parse().unwrap()));

        let arm64 = Platform::new("linux", "arm64");
        let decision = decide(document(&index()), &arm64, no_lookup).unwrap();
        assert_eq!(decision, Decision::Select(ARM64.parse().unwrap()));
    }

    #[test]
    fn index_without_platform() {
        let s390x = Platform::new("linux", "s390x");
        match decide(document(&index()), &s390x, no_lookup) {
            Err(Error::Platform(p)) => assert_eq!(p, s390x),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn manifest_platform() {
        let amd64 = Platform::new("linux", "amd64");

        let decision = decide(document(&manifest(OCI_CONFIG)), &amd64, |config| {
            assert_eq!(config.digest.to_string(), CONFIG);
            Ok(built_for("amd64"))
        });
        assert_eq!(decision.unwrap(), Decision::Keep);

        match decide(document(&manifest(OCI_CONFIG)), &amd64, |_| Ok(built_for("arm64"))) {
            Err(Error::PlatformMismatch { found, wanted }) => {
                assert_eq!(found, Platform::new("linux", "arm64"));
                assert_eq!(wanted, amd64);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn manifest_config_lookup() {
        let amd64 = Platform::new("linux", "amd64");

        // Artifacts carry no platform.
        let body = manifest("application/vnd.oci.empty.v1+json");
        let decision = decide(document(&body), &amd64, no_lookup);
        assert_eq!(decision.unwrap(), Decision::Keep);

        let failed = decide(document(&manifest(OCI_CONFIG)), &amd64, |_| {
            Err(Error::Status {
                url: CONFIG.into(),
                code: 404,
            })
        });
        assert!(matches!(failed, Err(Error::Status { code: 404, .. })));
    }

    #[test]
    fn malformed_is_deferred() {
        let amd64 = Platform::new("linux", "amd64");
        let decision = decide(document("{ not json"), &amd64, no_lookup);
        assert_eq!(decision.unwrap(), Decision::Keep);

        assert!(fetched("{ not json").parse().is_err());
    }

    #[test]
    fn parse() {
        let image = fetched(&manifest(OCI_CONFIG)).parse().unwrap();
        assert_eq!(image.manifest().layers.len(), 1);
        assert_eq!(image.to_string(), "ghcr.io/acme/disk@v1");

        let err = fetched(&index()).parse().unwrap_err();
        assert!(err.to_string().contains("expected an image manifest"));
    }

    #[test]
    fn fetch_uses_kept_body() {
        let (repo, ..) = Repository::new("ghcr.io/acme/disk:v1").unwrap();
        let body = manifest(OCI_CONFIG).into_bytes();
        let resolved = Resolved {
            repo,
            reference: "v1".into(),
            fetched: Some((Some(OCI_MANIFEST.into()), body.clone())),
        };

        let fetched = resolved.fetch().unwrap();
        assert_eq!(fetched.body, body);
        assert_eq!(fetched.content_type.as_deref(), Some(OCI_MANIFEST));
    }
}
