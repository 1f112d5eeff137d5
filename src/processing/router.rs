//! Strategy selection for an uploaded file.

use crate::processing::types::Strategy;
use std::path::Path;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// Choose the extraction strategy for a file.
///
/// A recognised `hint` always wins. Otherwise the display filename's extension decides (falling
/// back to the stored path's extension when the filename has none): PDFs are `structured`, raster
/// images are `ocr`, and anything else goes to `vision`.
pub fn choose_route(path: &Path, filename: &str, hint: Option<&str>) -> Strategy {
    if let Some(strategy) = hint.and_then(Strategy::from_hint) {
        return strategy;
    }

    let extension = extension_of(Path::new(filename)).or_else(|| extension_of(path));
    match extension.as_deref() {
        Some("pdf") => Strategy::Structured,
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Strategy::Ocr,
        _ => Strategy::Vision,
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(filename: &str, hint: Option<&str>) -> Strategy {
        choose_route(Path::new("/data/uploads/job__upload"), filename, hint)
    }

    #[test]
    fn extension_decides_without_hint() {
        assert_eq!(route("doc.pdf", None), Strategy::Structured);
        assert_eq!(route("REPORT.PDF", None), Strategy::Structured);
        assert_eq!(route("scan.png", None), Strategy::Ocr);
        assert_eq!(route("photo.JPeG", None), Strategy::Ocr);
        assert_eq!(route("x.xyz", None), Strategy::Vision);
        assert_eq!(route("README", None), Strategy::Vision);
    }

    #[test]
    fn hint_overrides_extension() {
        assert_eq!(route("scan.png", Some("vision")), Strategy::Vision);
        assert_eq!(route("doc.pdf", Some("ocr")), Strategy::Ocr);
        assert_eq!(route("scan.png", Some("docling")), Strategy::Structured);
    }

    #[test]
    fn unknown_hint_is_ignored() {
        assert_eq!(route("scan.png", Some("fast")), Strategy::Ocr);
        assert_eq!(route("doc.pdf", Some("")), Strategy::Structured);
    }

    #[test]
    fn stored_path_extension_is_used_when_filename_has_none() {
        assert_eq!(
            choose_route(Path::new("/data/uploads/job__scan.webp"), "scan", None),
            Strategy::Ocr
        );
    }
}
