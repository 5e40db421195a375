use url::Url;

/// File name used when a URL has no usable last path segment
pub(crate) const DEFAULT_FILE_NAME: &str = "index.html";

/// Derive a local file name from the last path segment of `url`.
///
/// Segments which could escape the target directory (`.`, `..`) or which
/// are empty fall back to [`DEFAULT_FILE_NAME`].
pub(crate) fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map_or_else(|| DEFAULT_FILE_NAME.to_string(), str::to_string)
}
