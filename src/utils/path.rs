/// Derives the destination object path for an uploaded file.
///
/// Exactly one trailing separator is stripped from the prefix before joining,
/// so `"course-banner"` and `"course-banner/"` both map `cover.png` to
/// `course-banner/cover.png`. The derivation is pure; the prefix may itself
/// contain nested segments.
pub fn destination_path(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
    format!("{}/{}", prefix, file_name)
}
