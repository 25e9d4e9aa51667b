//! Server-side page rendering
//!
//! Templates ship inside the binary (`templates/`, embedded with
//! rust-embed). A same-named file in the configured override directory
//! replaces the built-in one, so a deployment can restyle pages without a
//! rebuild.

mod error;


pub use error::ViewError;

use crate::models::UserSummary;
use anyhow::Result;
use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

/// Built-in templates
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct BuiltinTemplates;

/// Templates other templates extend or import; loaded first
const BASE_TEMPLATES: &[&str] = &["layout.html", "macros.html"];

/// Renders pages with Tera
pub struct ViewEngine {
    tera: Tera,
    overrides_path: PathBuf,
}

impl ViewEngine {
    /// Load the built-in templates plus any overrides from `overrides_path`.
    ///
    /// A missing override directory is not an error.
    pub fn new(overrides_path: &Path) -> Result<Self> {
        let mut engine = Self {
            tera: Tera::default(),
            overrides_path: overrides_path.to_path_buf(),
        };
        engine.reload()?;
        Ok(engine)
    }

    /// Re-read all templates
    pub fn reload(&mut self) -> Result<()> {
        let mut templates: Vec<(String, String)> = Vec::new();

        for name in BuiltinTemplates::iter() {
            if let Some(file) = BuiltinTemplates::get(&name) {
                let content = String::from_utf8_lossy(&file.data).into_owned();
                templates.push((name.to_string(), content));
            }
        }

        for (name, content) in self.collect_overrides()? {
            match templates.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = content,
                None => templates.push((name, content)),
            }
        }

        // Sort templates so base templates are loaded first
        templates.sort_by_key(|(name, _)| !BASE_TEMPLATES.contains(&name.as_str()));

        let mut tera = Tera::default();
        for (name, content) in templates {
            tera.add_raw_template(&name, &content).map_err(|e| {
                ViewError::TemplateError(format!("Failed to add template {}: {}", name, e))
            })?;
        }
        tera.build_inheritance_chains().map_err(|e| {
            ViewError::TemplateError(format!("Failed to build template inheritance: {}", e))
        })?;

        self.tera = tera;
        Ok(())
    }

    /// `*.html` files directly under the override directory
    fn collect_overrides(&self) -> Result<Vec<(String, String)>> {
        let mut templates = Vec::new();
        if !self.overrides_path.is_dir() {
            return Ok(templates);
        }

        for entry in std::fs::read_dir(&self.overrides_path).map_err(ViewError::from)? {
            let path = entry.map_err(ViewError::from)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                let content = std::fs::read_to_string(&path).map_err(ViewError::from)?;
                tracing::debug!("Template override: {}", name);
                templates.push((name.to_string(), content));
            }
        }
        Ok(templates)
    }

    /// Render a template, reporting the whole Tera error chain on failure
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            let mut error_msg = format!("Failed to render '{}': {}", template, e);
            let mut source = e.source();
            while let Some(s) = source {
                error_msg.push_str(&format!("\n  Caused by: {}", s));
                source = s.source();
            }
            ViewError::TemplateError(error_msg).into()
        })
    }

    /// Render `template` with the page variables merged into `context`
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        vars: &PageVars,
    ) -> Result<String> {
        let mut full_context = context.clone();
        full_context.insert("title", &vars.title);
        full_context.insert("site_name", &vars.site_name);
        full_context.insert("request_path", &vars.request_path);
        full_context.insert("current_user", &vars.current_user);
        full_context.insert("flash", &vars.flash);
        full_context.insert("year", &vars.year);
        self.render(template, &full_context)
    }

    /// Render `error.html`, falling back to a bare HTML page when that
    /// template itself fails. Never fails.
    pub fn render_error(&self, message: &str, vars: &PageVars) -> String {
        let mut context = TeraContext::new();
        context.insert("error_message", message);

        match self.render_page("error.html", &context, vars) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render error template: {:#}", e);
                simple_error_page(message)
            }
        }
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

/// Last-resort error page
fn simple_error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Error</title>
</head>
<body>
    <h1>Something went wrong</h1>
    <p>{}</p>
</body>
</html>"#,
        tera::escape_html(message)
    )
}

/// Severity of a one-shot notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
    Info,
}

impl FlashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
            FlashKind::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(FlashKind::Success),
            "error" => Some(FlashKind::Error),
            "info" => Some(FlashKind::Info),
            _ => None,
        }
    }
}

/// A one-shot notice shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub messages: Vec<String>,
}

impl Flash {
    pub fn new(kind: FlashKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            messages: vec![message.into()],
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Info, message)
    }

    /// One error notice listing every message
    pub fn errors(messages: Vec<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            messages,
        }
    }
}

/// Variables every page receives
#[derive(Debug, Clone, Serialize)]
pub struct PageVars {
    pub title: String,
    pub site_name: String,
    pub current_user: Option<UserSummary>,
    pub flash: Option<Flash>,
    pub request_path: String,
    /// Current year (for the footer)
    pub year: i32,
}

impl PageVars {
    pub fn new(
        title: impl Into<String>,
        site_name: impl Into<String>,
        request_path: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            site_name: site_name.into(),
            current_user: None,
            flash: None,
            request_path: request_path.into(),
            year: chrono::Utc::now().year(),
        }
    }

    pub fn with_user(mut self, user: Option<UserSummary>) -> Self {
        self.current_user = user;
        self
    }

    pub fn with_flash(mut self, flash: Option<Flash>) -> Self {
        self.flash = flash;
        self
    }
}
