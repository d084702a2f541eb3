// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use std::fmt::Display;
use std::io::{BufReader, Chain, Cursor, Read, Result};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use xz2::read::XzDecoder;

/// A reader with its already-inspected header bytes pushed back in front
pub type Primed<R> = Chain<Cursor<Vec<u8>>, R>;

/// The compression formats recognized from a blob name
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Codec {
    Bzip2,
    Gzip,
    Xz,
    Zstd,
}

impl Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Codec::Bzip2 => "bzip2",
            Codec::Gzip => "gzip",
            Codec::Xz => "xz",
            Codec::Zstd => "zstd",
        })
    }
}

impl Codec {
    /// Selects a codec by the suffix of `name`
    ///
    /// The match is exact; `.GZ` is not `.gz`.
    pub fn from_name(name: &str) -> std::result::Result<Self, Unsupported> {
        match suffix(name) {
            ".bz2" | ".bzip2" => Ok(Codec::Bzip2),
            ".gz" => Ok(Codec::Gzip),
            ".xz" => Ok(Codec::Xz),
            ".zs" | ".zst" => Ok(Codec::Zstd),
            other => Err(Unsupported(other.into())),
        }
    }

    /// Whether `head` starts the way a stream of this codec must
    fn accepts(self, head: &[u8]) -> bool {
        match self {
            Codec::Bzip2 => {
                head.len() == 4 && head.starts_with(b"BZh") && (b'1'..=b'9').contains(&head[3])
            }
            Codec::Gzip => head == b"\x1f\x8b\x08",
            Codec::Xz => head == b"\xfd7zXZ\x00",

            // A regular frame, or a skippable frame (0x184D2A5?)
            Codec::Zstd => {
                let skippable = head.len() == 4
                    && head[0] & 0xf0 == 0x50
                    && head[1..] == b"\x2a\x4d\x18"[..];

                head == b"\x28\xb5\x2f\xfd" || skippable
            }
        }
    }

    fn header_len(self) -> usize {
        match self {
            Codec::Bzip2 => 4,
            Codec::Gzip => 3,
            Codec::Xz => 6,
            Codec::Zstd => 4,
        }
    }
}

/// The extension of the last path component of `name`, dot included
///
/// Returns an empty string when there is none.
pub fn suffix(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(n) => &base[n..],
        None => "",
    }
}

/// No codec is known for this suffix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unsupported(pub String);

impl std::error::Error for Unsupported {}
impl Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown compression suffix [{}]", self.0)
    }
}

#[derive(Debug)]
pub enum Error {
    /// The name has no recognized compression suffix
    Unsupported(Unsupported),

    /// The stream does not start like the codec requires
    Init(Codec, std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Unsupported(e) => Some(e),
            Error::Init(.., e) => Some(e),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unsupported(e) => Display::fmt(e, f),
            Error::Init(codec, ..) => write!(f, "unable to start {} decoder", codec),
        }
    }
}

/// A decompressing reader over one of the recognized codecs
///
/// Dropping the decoder releases the codec state before the wrapped
/// reader.
pub enum Decoder<R: Read> {
    Plain(R),
    Bzip2(MultiBzDecoder<Primed<R>>),
    Gzip(MultiGzDecoder<Primed<R>>),
    Xz(XzDecoder<Primed<R>>),
    Zstd(zstd::Decoder<'static, BufReader<Primed<R>>>),
}

impl<R: Read> std::fmt::Debug for Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Plain(..) => "Plain",
            Self::Bzip2(..) => "Bzip2",
            Self::Gzip(..) => "Gzip",
            Self::Xz(..) => "Xz",
            Self::Zstd(..) => "Zstd",
        };

        f.debug_tuple("Decoder").field(&name).finish()
    }
}

impl<R: Read> Decoder<R> {
    /// Passes the reader through untouched
    pub fn plain(reader: R) -> Self {
        Self::Plain(reader)
    }

    /// Selects a decoder by the suffix of `name` and starts it on `reader`
    pub fn for_name(name: &str, reader: R) -> std::result::Result<Self, Error> {
        let codec = Codec::from_name(name).map_err(Error::Unsupported)?;
        Self::new(codec, reader).map_err(|e| Error::Init(codec, e))
    }

    /// Starts a decoder of `codec` on `reader`
    ///
    /// The header is read up front so that a stream of the wrong format
    /// fails here rather than midway through a copy.
    pub fn new(codec: Codec, mut reader: R) -> Result<Self> {
        let mut head = Vec::with_capacity(codec.header_len());
        (&mut reader)
            .take(codec.header_len() as u64)
            .read_to_end(&mut head)?;

        if !codec.accepts(&head) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid {} header", codec),
            ));
        }

        let primed = Cursor::new(head).chain(reader);
        Ok(match codec {
            Codec::Bzip2 => Self::Bzip2(MultiBzDecoder::new(primed)),
            Codec::Gzip => Self::Gzip(MultiGzDecoder::new(primed)),
            Codec::Xz => Self::Xz(XzDecoder::new_multi_decoder(primed)),
            Codec::Zstd => Self::Zstd(zstd::Decoder::new(primed)?),
        })
    }

    pub fn codec(&self) -> Option<Codec> {
        match self {
            Self::Plain(..) => None,
            Self::Bzip2(..) => Some(Codec::Bzip2),
            Self::Gzip(..) => Some(Codec::Gzip),
            Self::Xz(..) => Some(Codec::Xz),
            Self::Zstd(..) => Some(Codec::Zstd),
        }
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::Plain(x) => x.read(buf),
            Self::Bzip2(x) => x.read(buf),
            Self::Gzip(x) => x.read(buf),
            Self::Xz(x) => x.read(buf),
            Self::Zstd(x) => x.read(buf),
        }
    }
}
