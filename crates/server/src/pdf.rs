//! Document rendering adapters.
//!
//! Every backend starts from the same Tera HTML. `html` returns it as is,
//! `wkhtmltopdf` converts it locally and `http` hands it to an external PDF
//! service. [`TimedRenderer`] bounds whichever one is configured.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{error, info, warn};

use woms_core::config::{RendererBackend, RendererConfig};
use woms_core::documents::{DocumentKind, DocumentRenderer, DocumentSource, RenderError, RenderedDocument};

const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    (
        "requisition_voucher.html.tera",
        include_str!("../../../templates/documents/requisition_voucher.html.tera"),
    ),
    (
        "purchase_order.html.tera",
        include_str!("../../../templates/documents/purchase_order.html.tera"),
    ),
];

/// Register custom Tera filters used by document templates.
///
/// - `money`: two decimals with thousands separators, e.g. `line.line_total | money`
pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

/// Decimals arrive as strings so no precision is lost on the way into the template.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::String(text) => Decimal::from_str(text)
            .map_err(|error| tera::Error::msg(format!("money filter: `{text}` is not a decimal: {error}")))?,
        tera::Value::Number(number) => Decimal::from_str(&number.to_string())
            .map_err(|error| tera::Error::msg(format!("money filter: {error}")))?,
        tera::Value::Null => Decimal::ZERO,
        other => return Err(tera::Error::msg(format!("money filter expects a number, got {other}"))),
    };
    Ok(tera::Value::String(format_money(amount)))
}

pub fn format_money(amount: Decimal) -> String {
    let rounded = format!("{:.2}", amount.round_dp(2).abs());
    let (whole, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{sign}{grouped}.{fraction}")
}

/// Renders documents to HTML with Tera.
#[derive(Clone, Debug)]
pub struct HtmlRenderer {
    tera: Tera,
}

impl HtmlRenderer {
    /// Loads `*.tera` files from `template_dir`, falling back to the templates
    /// compiled into the binary when the directory is missing or incomplete.
    pub fn from_dir(template_dir: &Path) -> Self {
        let pattern = format!("{}/**/*.tera", template_dir.display());
        match Tera::new(&pattern) {
            Ok(mut tera) if has_document_templates(&tera) => {
                configure(&mut tera);
                info!(
                    event_name = "system.renderer.templates_loaded",
                    template_dir = %template_dir.display(),
                    "document templates loaded from filesystem"
                );
                Self { tera }
            }
            Ok(_) => {
                warn!(
                    template_dir = %template_dir.display(),
                    "document templates missing from directory, using embedded templates"
                );
                Self::embedded()
            }
            Err(error) => {
                warn!(error = %error, "failed to load document templates, using embedded templates");
                Self::embedded()
            }
        }
    }

    pub fn embedded() -> Self {
        let mut tera = Tera::default();
        for (name, body) in EMBEDDED_TEMPLATES {
            if let Err(error) = tera.add_raw_template(name, body) {
                error!(template = %name, error = %error, "embedded document template failed to parse");
            }
        }
        configure(&mut tera);
        Self { tera }
    }

    pub fn render_html(&self, source: &DocumentSource) -> Result<String, RenderError> {
        let mut context = Context::new();
        context.insert("doc", source);
        self.tera
            .render(source.kind.template_name(), &context)
            .map_err(|error| RenderError::Template(template_error_chain(&error)))
    }
}

fn configure(tera: &mut Tera) {
    tera.autoescape_on(vec![".html.tera"]);
    register_template_filters(tera);
}

fn has_document_templates(tera: &Tera) -> bool {
    let names = tera.get_template_names().collect::<Vec<_>>();
    [DocumentKind::RequisitionVoucher, DocumentKind::PurchaseOrder]
        .iter()
        .all(|kind| names.contains(&kind.template_name()))
}

fn template_error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[async_trait]
impl DocumentRenderer for HtmlRenderer {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn render(&self, source: &DocumentSource) -> Result<RenderedDocument, RenderError> {
        let html = self.render_html(source)?;
        Ok(RenderedDocument {
            content_type: "text/html; charset=utf-8".to_string(),
            file_name: format!("{}.html", source.file_stem()),
            bytes: html.into_bytes(),
        })
    }
}

/// Converts the HTML with a local `wkhtmltopdf` binary.
pub struct WkhtmltopdfRenderer {
    html: HtmlRenderer,
    binary: PathBuf,
}

impl WkhtmltopdfRenderer {
    pub fn locate(html: HtmlRenderer) -> Result<Self, RenderError> {
        let binary = which::which("wkhtmltopdf")
            .map_err(|_| RenderError::Unavailable("wkhtmltopdf not found in PATH".to_string()))?;
        info!(path = %binary.display(), "wkhtmltopdf found");
        Ok(Self { html, binary })
    }

    async fn convert(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let temp_dir = std::env::temp_dir();
        let job = uuid::Uuid::new_v4();
        let html_path = temp_dir.join(format!("woms_{job}.html"));
        let pdf_path = temp_dir.join(format!("woms_{job}.pdf"));

        tokio::fs::write(&html_path, html).await?;

        let output = Command::new(&self.binary)
            .args(["--page-size", "A4"])
            .args(["--margin-top", "10mm", "--margin-bottom", "10mm"])
            .args(["--margin-left", "10mm", "--margin-right", "10mm"])
            .args(["--encoding", "utf-8", "--quiet"])
            .arg(&html_path)
            .arg(&pdf_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let result = match output {
            Ok(output) if output.status.success() => tokio::fs::read(&pdf_path).await.map_err(RenderError::from),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                error!(stderr = %stderr, "wkhtmltopdf failed");
                Err(RenderError::Conversion(stderr))
            }
            Err(error) => Err(RenderError::Io(error)),
        };

        let _ = tokio::fs::remove_file(&html_path).await;
        let _ = tokio::fs::remove_file(&pdf_path).await;
        result
    }
}

#[async_trait]
impl DocumentRenderer for WkhtmltopdfRenderer {
    fn name(&self) -> &'static str {
        "wkhtmltopdf"
    }

    async fn render(&self, source: &DocumentSource) -> Result<RenderedDocument, RenderError> {
        let html = self.html.render_html(source)?;
        let bytes = self.convert(&html).await?;
        info!(size = bytes.len(), file = %source.file_stem(), "PDF generated");
        Ok(RenderedDocument {
            content_type: "application/pdf".to_string(),
            file_name: format!("{}.pdf", source.file_stem()),
            bytes,
        })
    }
}

/// Posts the HTML to an external converter and returns whatever it answers with.
pub struct HttpRenderer {
    html: HtmlRenderer,
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRenderer {
    pub fn new(html: HtmlRenderer, endpoint: impl Into<String>) -> Self {
        Self { html, client: reqwest::Client::new(), endpoint: endpoint.into() }
    }
}

#[async_trait]
impl DocumentRenderer for HttpRenderer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn render(&self, source: &DocumentSource) -> Result<RenderedDocument, RenderError> {
        let html = self.html.render_html(source)?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(html)
            .send()
            .await
            .map_err(|error| RenderError::Unavailable(format!("PDF service request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Unavailable(format!("PDF service answered {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/pdf")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| RenderError::Unavailable(format!("PDF service body failed: {error}")))?;

        Ok(RenderedDocument {
            content_type,
            file_name: format!("{}.pdf", source.file_stem()),
            bytes: bytes.to_vec(),
        })
    }
}

/// Bounds every render call. A renderer that does not answer in time is
/// reported as unavailable; nothing it was rendering is touched.
pub struct TimedRenderer {
    inner: Arc<dyn DocumentRenderer>,
    timeout: Duration,
}

impl TimedRenderer {
    pub fn new(inner: Arc<dyn DocumentRenderer>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl DocumentRenderer for TimedRenderer {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn render(&self, source: &DocumentSource) -> Result<RenderedDocument, RenderError> {
        let result = match tokio::time::timeout(self.timeout, self.inner.render(source)).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(self.timeout.as_secs())),
        };

        if let Err(error) = &result {
            warn!(
                event_name = "renderer.failed",
                renderer = self.inner.name(),
                reference = %source.reference,
                error = %error,
                "document render failed"
            );
        }
        result
    }
}

/// Builds the configured backend wrapped in the render timeout.
pub fn build_renderer(config: &RendererConfig) -> Result<Arc<dyn DocumentRenderer>, RenderError> {
    let html = HtmlRenderer::from_dir(&config.template_dir);
    let backend: Arc<dyn DocumentRenderer> = match config.backend {
        RendererBackend::Html => Arc::new(html),
        RendererBackend::Wkhtmltopdf => Arc::new(WkhtmltopdfRenderer::locate(html)?),
        RendererBackend::Http => {
            let endpoint = config.service_url.clone().ok_or_else(|| {
                RenderError::Unavailable("renderer.service_url is required for the http backend".to_string())
            })?;
            Arc::new(HttpRenderer::new(html, endpoint))
        }
    };

    Ok(Arc::new(TimedRenderer::new(backend, Duration::from_secs(config.timeout_secs))))
}
