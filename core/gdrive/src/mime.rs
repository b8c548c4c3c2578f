//! MIME type rules for listing and importing Drive files.

/// Prefix shared by Google-native document types (Docs, Sheets, Slides...).
pub const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps";

/// Output type of exported native documents.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// MIME patterns (substring match) offered for import.
pub const IMPORTABLE_MIME_PATTERNS: &[&str] = &[
    "application/pdf",
    "image/",
    "application/vnd.google-apps.spreadsheet",
    "application/vnd.google-apps.document",
    "application/vnd.google-apps.presentation",
];

/// How a file's content is fetched from Drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Native document converted to PDF through the export endpoint.
    Export,
    /// Binary file downloaded as-is.
    Download,
}

impl ImportMode {
    /// Choose the mode for a file of the given MIME type.
    pub fn for_mime_type(mime_type: &str) -> Self {
        if mime_type.starts_with(GOOGLE_APPS_PREFIX) {
            Self::Export
        } else {
            Self::Download
        }
    }

    /// MIME type of the fetched content.
    pub fn output_mime_type<'a>(&self, original: &'a str) -> &'a str {
        match self {
            Self::Export => PDF_MIME_TYPE,
            Self::Download => original,
        }
    }

    /// Attachment name for a file called `name`.
    pub fn display_name(&self, name: &str) -> String {
        match self {
            Self::Export => format!("{}.pdf", name),
            Self::Download => name.to_string(),
        }
    }
}

/// Drive search query selecting the user's own, non-trashed, importable files.
pub fn listing_query() -> String {
    let mime_filter = IMPORTABLE_MIME_PATTERNS
        .iter()
        .map(|pattern| format!("mimeType contains '{}'", pattern))
        .collect::<Vec<_>>()
        .join(" or ");

    format!("'me' in owners and trashed = false and ({})", mime_filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_native_document_is_exported_as_pdf() {
        let mode = ImportMode::for_mime_type("application/vnd.google-apps.document");
        assert_eq!(mode, ImportMode::Export);
        assert_eq!(mode.output_mime_type("application/vnd.google-apps.document"), "application/pdf");
        assert_eq!(mode.display_name("Report"), "Report.pdf");
    }

    #[test]
    fn test_image_is_downloaded_unchanged() {
        let mode = ImportMode::for_mime_type("image/png");
        assert_eq!(mode, ImportMode::Download);
        assert_eq!(mode.output_mime_type("image/png"), "image/png");
        assert_eq!(mode.display_name("Photo.png"), "Photo.png");
    }

    #[test]
    fn test_listing_query() {
        let query = listing_query();
        assert!(query.starts_with("'me' in owners and trashed = false and ("));
        assert!(query.contains("mimeType contains 'image/'"));
        assert!(query.contains(
            "mimeType contains 'application/pdf' or mimeType contains 'image/'"
        ));
        assert!(query.ends_with("mimeType contains 'application/vnd.google-apps.presentation')"));
    }

    proptest! {
        #[test]
        fn native_types_always_export_to_pdf(kind in "[a-z]{1,12}", name in "[A-Za-z0-9 ]{1,24}") {
            let mime = format!("application/vnd.google-apps.{}", kind);
            let mode = ImportMode::for_mime_type(&mime);
            prop_assert_eq!(mode.output_mime_type(&mime), PDF_MIME_TYPE);
            prop_assert!(mode.display_name(&name).ends_with(".pdf"));
        }

        #[test]
        fn other_types_pass_through(subtype in "[a-z]{1,10}", name in "[A-Za-z0-9 .]{1,24}") {
            let mime = format!("image/{}", subtype);
            let mode = ImportMode::for_mime_type(&mime);
            prop_assert_eq!(mode.output_mime_type(&mime), mime.as_str());
            prop_assert_eq!(mode.display_name(&name), name);
        }
    }
}
