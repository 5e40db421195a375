use bytes::Bytes;
use encoding_rs::{Encoding, GB18030, UTF_8};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString, VariantNames};
use url::Url;

use crate::utils::url::file_name_from_url;
use crate::{ErrorKind, Result};

/// Text encoding used to decode a response body
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ResponseEncoding {
    /// UTF-8
    #[default]
    Utf8,
    /// GBK, decoded as its superset GB18030
    Gbk,
}

impl ResponseEncoding {
    const fn encoding(self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            Self::Gbk => GB18030,
        }
    }
}

/// File header plus the smallest DIB header; pixel data cannot start earlier
const BMP_MIN_DATA_OFFSET: u32 = 14 + 12;

/// Image formats recognized by their leading magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    /// Portable Network Graphics
    Png,
    /// JPEG / JFIF
    Jpeg,
    /// GIF87a and GIF89a
    Gif,
    /// WebP in a RIFF container
    Webp,
    /// Windows bitmap
    Bmp,
    /// Windows icon
    Ico,
}

impl ImageFormat {
    /// Recognize the format of `data`, if it is an image
    #[must_use]
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', ..] => Some(Self::Png),
            [0xff, 0xd8, 0xff, ..] => Some(Self::Jpeg),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            [b'B', b'M', _, _, _, _, 0, 0, 0, 0, o0, o1, o2, o3, ..]
                if u32::from_le_bytes([*o0, *o1, *o2, *o3]) >= BMP_MIN_DATA_OFFSET =>
            {
                Some(Self::Bmp)
            }
            [0x00, 0x00, 0x01, 0x00, ..] => Some(Self::Ico),
            _ => None,
        }
    }

    /// The usual file extension for this format
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Ico => "ico",
        }
    }
}

/// An image downloaded as a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Format detected from the image data
    pub format: ImageFormat,
    /// The encoded image
    pub data: Bytes,
}

/// The body of a response, with decoders for the supported formats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    data: Bytes,
    source: Url,
}

impl Content {
    /// Wrap a body that was downloaded from `source`
    #[must_use]
    pub const fn new(data: Bytes, source: Url) -> Self {
        Self { data, source }
    }

    /// The URL the content was downloaded from, after redirects
    #[must_use]
    pub const fn source(&self) -> &Url {
        &self.source
    }

    /// File name derived from the last path segment of the source URL,
    /// `index.html` if there is none
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name_from_url(&self.source)
    }

    /// Size of the body in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the body is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw body
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Decode the body as text.
    ///
    /// Bodies which are not valid in `encoding` are decoded as ISO-8859-1
    /// instead, which maps every byte to a character and therefore never fails.
    #[must_use]
    pub fn to_string(&self, encoding: ResponseEncoding) -> String {
        match encoding
            .encoding()
            .decode_without_bom_handling_and_without_replacement(&self.data)
        {
            Some(text) => text.into_owned(),
            None => {
                log::debug!(
                    "Body of {} is not valid {encoding}, decoding it as ISO-8859-1",
                    self.source
                );
                self.data.iter().copied().map(char::from).collect()
            }
        }
    }

    /// Decode the body as JSON.
    ///
    /// JSONP responses such as `callback({"a": 1});` are unwrapped first:
    /// if the trimmed text ends with `)` (optionally followed by `;`), only the
    /// part between the first `(` and the last `)` is parsed.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Json`] if the (unwrapped) text is not valid JSON
    /// for `T`.
    pub fn to_json<T: DeserializeOwned>(&self, encoding: ResponseEncoding) -> Result<T> {
        let text = self.to_string(encoding);
        Ok(serde_json::from_str(strip_jsonp(&text))?)
    }

    /// Interpret the body as an image
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotAnImage`] if the body does not start with the
    /// signature of a supported image format.
    pub fn to_image(&self) -> Result<Image> {
        let format = ImageFormat::sniff(&self.data).ok_or(ErrorKind::NotAnImage)?;
        Ok(Image {
            format,
            data: self.data.clone(),
        })
    }

    /// Write the body to a file and return its path.
    ///
    /// Without `destination`, the file is named after the last segment of the
    /// source URL and placed in the current directory. Missing parent
    /// directories are created. The body is written to a temporary file next
    /// to the destination first and then renamed, so readers never see a
    /// partially written file.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IoError`] with the offending path if a directory
    /// or the file cannot be written.
    pub async fn to_file(&self, destination: Option<&Path>) -> Result<PathBuf> {
        let path = match destination {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(self.file_name()),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ErrorKind::IoError(Some(parent.to_path_buf()), e))?;
        }

        let data = self.data.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &data))
            .await
            .map_err(|e| ErrorKind::IoError(Some(path.clone()), std::io::Error::other(e)))??;

        log::debug!("Saved {} bytes to {}", self.data.len(), path.display());
        Ok(path)
    }
}

/// Write `data` to a uniquely named temporary file next to `path` and move
/// it into place. Concurrent writers to the same path never share a
/// temporary file; the last rename wins.
fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::Builder::new()
        .prefix(".hostgate-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| ErrorKind::IoError(Some(dir.to_path_buf()), e))?;
    file.write_all(data)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| ErrorKind::IoError(Some(file.path().to_path_buf()), e))?;
    // On failure the temporary file is removed when `PersistError` drops
    file.persist(path)
        .map_err(|e| ErrorKind::IoError(Some(path.to_path_buf()), e.error))?;
    Ok(())
}

fn strip_jsonp(text: &str) -> &str {
    let trimmed = text.trim();
    let call = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    if !call.ends_with(')') {
        return trimmed;
    }
    match (call.find('('), call.rfind(')')) {
        (Some(start), Some(end)) if start < end => &call[start + 1..end],
        _ => trimmed,
    }
}
