// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use super::{Error, Resolved};
use crate::formats::{self, oci::Platform};

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};

use base64::engine::{general_purpose::STANDARD, Engine};
use log::debug;
use regex::Regex;
use serde::Deserialize;
use ureq::{Agent, AgentBuilder, Response};

/// Registry credentials taken from the environment
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`; both must be set
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("REGISTRY_USERNAME").ok()?;
        let password = std::env::var("REGISTRY_PASSWORD").ok()?;
        Some(Self::new(username, password))
    }

    fn basic(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

#[derive(Clone, Debug)]
pub struct Repository {
    agent: Agent,
    host: String,
    path: String,
    credentials: Option<Credentials>,
    authorization: Arc<RwLock<Option<String>>>,
}

impl Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut host = &*self.host;
        for (into, from) in Self::ALIASES {
            if &*self.host == *from && from.len() > into.len() {
                host = *into;
                break;
            }
        }

        write!(f, "{}/{}", host, self.path)
    }
}

impl Repository {
    /// Answers a `Www-Authenticate` challenge and remembers the result
    fn authenticate(&self, challenge: &str) -> Result<(), Error> {
        #[derive(Deserialize)]
        struct Token {
            token: Option<String>,
            access_token: Option<String>,
        }

        const RE: &str = "([a-z_]+)=\"([^\"]*)\"";

        let (scheme, params) = challenge.trim().split_once(' ').unwrap_or((challenge, ""));

        let authorization = if scheme.eq_ignore_ascii_case("basic") {
            let credentials = self.credentials.as_ref().ok_or_else(|| {
                Error::Auth("registry requires REGISTRY_USERNAME and REGISTRY_PASSWORD".into())
            })?;

            credentials.basic()
        } else if scheme.eq_ignore_ascii_case("bearer") {
            let re = Regex::new(RE).map_err(|e| Error::Auth(e.to_string()))?;

            let mut map = HashMap::new();
            for caps in re.captures_iter(params) {
                map.insert(caps[1].to_string(), caps[2].to_string());
            }

            let realm = map
                .remove("realm")
                .ok_or_else(|| Error::Auth(format!("no realm in challenge {:?}", challenge)))?;

            debug!("requesting token from {}", realm);

            let mut req = self.agent.get(&realm);
            for (k, v) in &map {
                req = req.query(k, v);
            }
            if let Some(credentials) = &self.credentials {
                req = req.set("Authorization", &credentials.basic());
            }

            let rep = req.call().map_err(|e| Error::Transport {
                url: realm.clone(),
                source: Box::new(e),
            })?;

            let token: Token = rep.into_json()?;
            match token.token.or(token.access_token) {
                Some(token) => format!("Bearer {}", token),
                None => return Err(Error::Auth(format!("no token issued by {}", realm))),
            }
        } else {
            return Err(Error::Auth(format!("unsupported scheme {:?}", scheme)));
        };

        // A poisoned lock still holds a whole value.
        let mut lock = self
            .authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *lock = Some(authorization);

        Ok(())
    }

    fn authorization(&self) -> Option<String> {
        self.authorization
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn get(&self, path: &str, accept: &[&str]) -> Result<Response, Error> {
        let url = format!("https://{}/v2/{}/{}", self.host, self.path, path);

        let mut retried = false;
        loop {
            let mut req = self.agent.get(&url);
            if !accept.is_empty() {
                req = req.set("Accept", &accept.join(", "));
            }
            if let Some(auth) = self.authorization() {
                req = req.set("Authorization", &auth);
            }

            match req.call() {
                Ok(rep) => return Ok(rep),

                Err(ureq::Error::Status(401, rep)) if !retried => {
                    let challenge = rep
                        .header("Www-Authenticate")
                        .ok_or(Error::Status {
                            url: url.clone(),
                            code: 401,
                        })?
                        .to_string();

                    self.authenticate(&challenge)?;
                    retried = true;
                }

                Err(ureq::Error::Status(code, ..)) => return Err(Error::Status { url, code }),

                Err(e) => {
                    return Err(Error::Transport {
                        url,
                        source: Box::new(e),
                    })
                }
            }
        }
    }

    /// Fetches a manifest or index by tag or digest
    ///
    /// Returns the `Content-Type` and the raw body.
    pub(super) fn manifest(&self, reference: &str) -> Result<(Option<String>, Vec<u8>), Error> {
        let rep = self.get(&format!("manifests/{}", reference), formats::ACCEPT)?;
        let content_type = rep.header("Content-Type").map(str::to_string);
        let body = limited(rep.into_reader(), Self::MANIFEST_LIMIT, reference)?;
        Ok((content_type, body))
    }

    pub(super) fn blob(&self, digest: &str) -> Result<Response, Error> {
        self.get(&format!("blobs/{}", digest), &[])
    }

    const MANIFEST_LIMIT: u64 = 4 << 20;

    const DEFAULT_REGISTRY: &'static str = "docker.io";
    const DEFAULT_PREFIX: &'static str = "library";

    const LOCALHOST: &'static str = "localhost";
    const ALIASES: &'static [(&'static str, &'static str)] = &[
        ("docker.io", "registry-1.docker.io"),
        ("index.docker.io", "registry-1.docker.io"),
    ];

    /// Splits `reference` into a repository and its tag or digest
    ///
    /// Unlike most tools, no tag is implied: a reference without a tag or
    /// digest is rejected.
    pub fn new(reference: &str) -> Result<(Self, &str), Error> {
        let invalid = || Error::Reference(reference.into());

        let full = reference.trim();
        if full.is_empty() {
            return Err(invalid());
        }

        // Remove the tag or digest. A digest wins over a tag.
        let sep = |s: &str| s.rfind('/');
        let (mut repository, tag) = match full.rfind('@') {
            Some(n) => {
                let mut lhs = &full[..n];
                if let Some(m) = lhs.rfind(':') {
                    if sep(lhs).map_or(true, |s| m > s) {
                        lhs = &lhs[..m];
                    }
                }

                (lhs, &full[n + 1..])
            }

            None => match full.rfind(':') {
                Some(n) if sep(full).map_or(true, |s| n > s) => (&full[..n], &full[n + 1..]),
                _ => return Err(invalid()),
            },
        };

        if tag.is_empty() || repository.is_empty() {
            return Err(invalid());
        }

        // Extract the registry
        let mut host = Self::DEFAULT_REGISTRY;
        if let Some((lhs, rhs)) = repository.find('/').map(|n| repository.split_at(n)) {
            if lhs.contains('.') || lhs.contains(':') || lhs == Self::LOCALHOST {
                repository = &rhs[1..];
                host = lhs;
            }
        }

        if repository.is_empty() {
            return Err(invalid());
        }

        // Add the default prefix if necessary.
        let path = match repository.find('/') {
            None if host == Self::DEFAULT_REGISTRY => {
                format!("{}/{}", Self::DEFAULT_PREFIX, repository)
            }
            _ => repository.into(),
        };

        // Substitute the aliases
        for (from, into) in Self::ALIASES {
            if host == *from {
                host = *into;
                break;
            }
        }

        let out = Self {
            agent: AgentBuilder::new().build(),
            host: host.into(),
            path,
            credentials: Credentials::from_env(),
            authorization: Arc::default(),
        };

        Ok((out, tag))
    }

    pub fn resolve(&self, tag: &str, platform: &Platform) -> Result<Resolved, Error> {
        Resolved::new(self.clone(), tag, platform)
    }
}

/// Reads all of `reader`, failing if it holds more than `limit` bytes
fn limited(reader: impl Read, limit: u64, reference: &str) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    reader.take(limit + 1).read_to_end(&mut body)?;

    if body.len() as u64 > limit {
        return Err(Error::TooLarge {
            reference: reference.into(),
            limit,
        });
    }

    Ok(body)
}
