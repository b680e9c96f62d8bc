//! crates/note_access_core/src/viewer.rs
//!
//! Builds what the host surface needs to display a note: either a generated
//! pdf.js page rendered in-app, or the URL of a web-based office viewer.
//! Also owns the navigation allow-list that keeps embedded content from
//! leaving the approved origins.

use std::sync::Arc;
use tracing::debug;

use crate::domain::DocumentType;
use crate::ports::ScreenCapture;

pub const PDF_JS_CDN_BASE: &str = "https://cdnjs.cloudflare.com/ajax/libs/pdf.js/3.11.174";
pub const OFFICE_VIEWER_BASE: &str = "https://docs.google.com/gview?embedded=1&url=";

const PDF_ALLOWED_PREFIXES: [&str; 3] = ["https://cdnjs.cloudflare.com/", "blob:", "data:"];
const OFFICE_ALLOWED_PREFIXES: [&str; 3] = [
    "https://docs.google.com/",
    "https://docs.googleusercontent.com/",
    "https://www.gstatic.com/",
];

//=========================================================================================
// Viewer targets
//=========================================================================================

/// What the host surface should load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerTarget {
    /// A generated page, loaded with the signed URL as its base URL.
    InlineHtml { html: String, base_url: String },
    /// A remote page loaded directly.
    Remote { url: String },
}

impl ViewerTarget {
    pub fn for_document(document_type: DocumentType, signed_url: &str) -> Self {
        if document_type.is_pdf() {
            ViewerTarget::InlineHtml {
                html: build_pdf_viewer_html(signed_url),
                base_url: signed_url.to_string(),
            }
        } else {
            ViewerTarget::Remote {
                url: office_viewer_url(signed_url),
            }
        }
    }
}

/// Wraps a signed document URL in the embedded office-document viewer.
pub fn office_viewer_url(signed_url: &str) -> String {
    if signed_url.is_empty() {
        return String::new();
    }
    format!("{}{}", OFFICE_VIEWER_BASE, urlencoding::encode(signed_url))
}

/// Encodes `value` as a JavaScript string literal that is safe inside a
/// `<script>` element.
fn js_string_literal(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted.replace("</", "<\\/")
}

/// Generates a self-contained page that fetches `signed_url` with pdf.js and
/// renders every page to a canvas, falling back to a static message when
/// the library or the render chain fails.
pub fn build_pdf_viewer_html(signed_url: &str) -> String {
    let pdf_url = js_string_literal(signed_url);
    format!(
        r##"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1, maximum-scale=1" />
    <title>PDF Viewer</title>
    <style>
      body {{
        margin: 0;
        background: #0f172a;
        color: #e2e8f0;
        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
      }}
      #status {{ padding: 12px; text-align: center; font-size: 14px; }}
      #viewer {{ padding: 8px; }}
      canvas {{
        display: block;
        max-width: 100%;
        height: auto;
        margin: 0 auto 10px auto;
        background: #fff;
        border-radius: 4px;
      }}
    </style>
    <script src="{cdn}/pdf.min.js"></script>
  </head>
  <body>
    <div id="status">Loading preview...</div>
    <div id="viewer"></div>
    <script>
      (function () {{
        var pdfUrl = {pdf_url};
        var statusEl = document.getElementById("status");
        var viewerEl = document.getElementById("viewer");
        function unavailable() {{
          statusEl.textContent = "Preview is unavailable.";
        }}
        if (!window.pdfjsLib) {{
          unavailable();
          return;
        }}
        window.pdfjsLib.GlobalWorkerOptions.workerSrc = "{cdn}/pdf.worker.min.js";

        function renderPage(pdf, pageNumber) {{
          return pdf.getPage(pageNumber).then(function (page) {{
            var viewport = page.getViewport({{ scale: 1 }});
            var targetWidth = Math.max(320, Math.min(window.innerWidth - 16, 1080));
            var scaled = page.getViewport({{ scale: targetWidth / viewport.width }});
            var outputScale = window.devicePixelRatio || 1;

            var canvas = document.createElement("canvas");
            var cssWidth = Math.floor(scaled.width);
            var cssHeight = Math.floor(scaled.height);
            canvas.style.width = cssWidth + "px";
            canvas.style.height = cssHeight + "px";
            canvas.width = Math.floor(cssWidth * outputScale);
            canvas.height = Math.floor(cssHeight * outputScale);
            viewerEl.appendChild(canvas);

            var renderContext = {{ canvasContext: canvas.getContext("2d"), viewport: scaled }};
            if (outputScale !== 1) {{
              renderContext.transform = [outputScale, 0, 0, outputScale, 0, 0];
            }}
            return page.render(renderContext).promise;
          }});
        }}

        window.pdfjsLib
          .getDocument({{ url: pdfUrl }})
          .promise
          .then(function (pdf) {{
            statusEl.textContent = "";
            var chain = Promise.resolve();
            for (var i = 1; i <= pdf.numPages; i += 1) {{
              chain = chain.then(renderPage.bind(null, pdf, i));
            }}
            return chain;
          }})
          .catch(unavailable);
      }})();
    </script>
  </body>
</html>"##,
        cdn = PDF_JS_CDN_BASE,
        pdf_url = pdf_url,
    )
}

//=========================================================================================
// Navigation allow-list
//=========================================================================================

/// Decides which in-viewer navigations may proceed.
#[derive(Debug, Clone)]
pub struct NavigationPolicy {
    signed_url: String,
    document_type: DocumentType,
}

impl NavigationPolicy {
    pub fn new(signed_url: impl Into<String>, document_type: DocumentType) -> Self {
        Self {
            signed_url: signed_url.into(),
            document_type,
        }
    }

    pub fn allows(&self, url: &str) -> bool {
        if url.is_empty() || url == "about:blank" {
            return true;
        }
        if !self.signed_url.is_empty() && url.starts_with(&self.signed_url) {
            return true;
        }
        let prefixes: &[&str] = if self.document_type.is_pdf() {
            &PDF_ALLOWED_PREFIXES
        } else {
            &OFFICE_ALLOWED_PREFIXES
        };
        let allowed = prefixes.iter().any(|prefix| url.starts_with(prefix));
        if !allowed {
            debug!(url, "Blocked viewer navigation.");
        }
        allowed
    }
}

//=========================================================================================
// Host surface
//=========================================================================================

/// Settings the host surface must apply for a viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SurfaceSettings {
    pub cache_enabled: bool,
    pub incognito: bool,
    pub javascript_enabled: bool,
    pub dom_storage_enabled: bool,
    pub multiple_windows: bool,
    pub back_forward_gestures: bool,
}

impl SurfaceSettings {
    /// No caching, no persistence, no escape hatches. Script and DOM storage
    /// stay on because the pdf.js page and the office viewer need them.
    pub const fn locked_down() -> Self {
        Self {
            cache_enabled: false,
            incognito: true,
            javascript_enabled: true,
            dom_storage_enabled: true,
            multiple_windows: false,
            back_forward_gestures: false,
        }
    }
}

/// Keeps screen capture blocked for as long as it is alive.
pub struct ScreenCaptureGuard {
    platform: Arc<dyn ScreenCapture>,
}

impl ScreenCaptureGuard {
    pub fn acquire(platform: Arc<dyn ScreenCapture>) -> Self {
        platform.prevent();
        Self { platform }
    }
}

impl Drop for ScreenCaptureGuard {
    fn drop(&mut self) {
        self.platform.allow();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    const SIGNED: &str = "https://files.example.com/notes/42.pdf?sig=abc&exp=99";

    #[test]
    fn foreign_origins_are_blocked_for_every_document_type() {
        for document_type in [DocumentType::Pdf, DocumentType::Doc, DocumentType::Docx] {
            let policy = NavigationPolicy::new(SIGNED, document_type);
            assert!(!policy.allows("https://evil.example/x"));
            assert!(policy.allows(SIGNED));
            assert!(policy.allows("about:blank"));
            assert!(policy.allows(""));
        }
    }

    #[test]
    fn pdf_allows_cdn_and_generated_content_only() {
        let policy = NavigationPolicy::new(SIGNED, DocumentType::Pdf);
        assert!(policy.allows("https://cdnjs.cloudflare.com/ajax/libs/pdf.js/3.11.174/pdf.min.js"));
        assert!(policy.allows("blob:https://files.example.com/1234"));
        assert!(policy.allows("data:image/png;base64,AAAA"));
        assert!(!policy.allows("https://docs.google.com/gview"));
    }

    #[test]
    fn office_allows_the_viewer_origins_only() {
        let policy = NavigationPolicy::new(SIGNED, DocumentType::Docx);
        assert!(policy.allows("https://docs.google.com/gview?embedded=1"));
        assert!(policy.allows("https://docs.googleusercontent.com/viewer/abc"));
        assert!(policy.allows("https://www.gstatic.com/script.js"));
        assert!(!policy.allows("blob:https://files.example.com/1234"));
        assert!(!policy.allows("https://cdnjs.cloudflare.com/anything"));
    }

    #[test]
    fn signed_url_prefix_check_is_literal() {
        let policy = NavigationPolicy::new("https://files.example.com/notes/42", DocumentType::Pdf);
        assert!(!policy.allows("https://files.example.com.evil.example/notes/42"));
    }

    #[test]
    fn office_url_percent_encodes_the_signed_url() {
        assert_eq!(
            office_viewer_url("https://f.example/a b.docx?x=1&y=2"),
            "https://docs.google.com/gview?embedded=1&url=https%3A%2F%2Ff.example%2Fa%20b.docx%3Fx%3D1%26y%3D2"
        );
        assert_eq!(office_viewer_url(""), "");
    }

    #[test]
    fn pdf_page_embeds_the_url_as_an_escaped_literal() {
        let html = build_pdf_viewer_html("https://f.example/x.pdf?q=\"</script><script>alert(1)");
        assert!(html.contains(r#"var pdfUrl = "https://f.example/x.pdf?q=\"<\/script><script>alert(1)";"#));
        assert!(html.contains("https://cdnjs.cloudflare.com/ajax/libs/pdf.js/3.11.174/pdf.min.js"));
        assert!(html.contains("Preview is unavailable."));
        assert!(html.contains("devicePixelRatio"));
    }

    #[test]
    fn target_follows_document_type() {
        match ViewerTarget::for_document(DocumentType::Pdf, SIGNED) {
            ViewerTarget::InlineHtml { base_url, .. } => assert_eq!(base_url, SIGNED),
            other => panic!("expected inline page, got {:?}", other),
        }
        match ViewerTarget::for_document(DocumentType::Doc, SIGNED) {
            ViewerTarget::Remote { url } => assert!(url.starts_with(OFFICE_VIEWER_BASE)),
            other => panic!("expected remote page, got {:?}", other),
        }
    }

    #[derive(Default)]
    struct CountingCapture(AtomicI32);

    impl ScreenCapture for CountingCapture {
        fn prevent(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn allow(&self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn screen_capture_is_released_on_drop() {
        let platform = Arc::new(CountingCapture::default());
        let guard = ScreenCaptureGuard::acquire(platform.clone());
        assert_eq!(platform.0.load(Ordering::SeqCst), 1);
        drop(guard);
        assert_eq!(platform.0.load(Ordering::SeqCst), 0);
    }
}
