//! Public site rendering
//!
//! Server-rendered HTML pages built with Tera:
//! - built-in templates embedded in the binary
//! - any `.html` file in `site.templates_path` replaces the built-in
//!   template of the same name
//! - standard variables (site settings, year, request path) on every page

use anyhow::{Context, Result};
use rust_embed::RustEmbed;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

use crate::services::SiteSettings;

mod error;
pub mod pages;


pub use error::SiteError;

/// Templates shipped with the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct BuiltinTemplates;

/// Variables every page gets
#[derive(Debug, Clone)]
pub struct StandardVars {
    pub settings: SiteSettings,
    pub request_path: String,
    pub year: i32,
}

impl StandardVars {
    pub fn new(settings: SiteSettings, request_path: impl Into<String>) -> Self {
        use chrono::Datelike;
        Self {
            settings,
            request_path: request_path.into(),
            year: chrono::Utc::now().year(),
        }
    }
}

pub struct SiteRenderer {
    tera: Tera,
}

impl SiteRenderer {
    /// Load the built-in templates, then the overrides in `templates_path`
    /// if that directory exists
    pub fn new(templates_path: &Path) -> Result<Self> {
        let mut templates: Vec<(String, String)> = Vec::new();

        for name in BuiltinTemplates::iter() {
            let file = BuiltinTemplates::get(&name)
                .with_context(|| format!("Embedded template vanished: {}", name))?;
            let content = std::str::from_utf8(&file.data)
                .with_context(|| format!("Template is not UTF-8: {}", name))?
                .to_string();
            templates.push((name.to_string(), content));
        }

        if templates_path.is_dir() {
            let mut overrides = Vec::new();
            collect_templates(templates_path, templates_path, &mut overrides)?;
            for (name, content) in overrides {
                tracing::info!("Using custom template {}", name);
                match templates.iter_mut().find(|(n, _)| *n == name) {
                    Some(existing) => existing.1 = content,
                    None => templates.push((name, content)),
                }
            }
        }

        Self::from_templates(templates)
    }

    /// Build from in-memory templates. They are added as one batch, so a
    /// template may extend any other regardless of order.
    pub fn from_templates(templates: Vec<(String, String)>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| SiteError::TemplateError(format!("Failed to load templates: {}", chain(&e))))?;

        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, SiteError> {
        self.tera.render(template, context).map_err(|e| {
            SiteError::TemplateError(format!("Failed to render '{}': {}", template, chain(&e)))
        })
    }

    /// Render with the standard variables added to `context`
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        vars: &StandardVars,
    ) -> Result<String, SiteError> {
        self.render(template, &with_standard_vars(context, vars))
    }

    /// Like `render_page` but never fails: falls back to `error.html`,
    /// then to a bare HTML page
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext, vars: &StandardVars) -> String {
        let context = with_standard_vars(context, vars);
        match self.render(template, &context) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("{}, trying error template", e);

                let mut error_context = context.clone();
                error_context.insert("status", &500);
                error_context.insert("error_message", "Something went wrong while rendering this page.");

                match self.render("error.html", &error_context) {
                    Ok(html) => html,
                    Err(error_template_err) => {
                        tracing::warn!("Error template failed too: {}", error_template_err);
                        simple_error_page(&e.to_string())
                    }
                }
            }
        }
    }
}

fn with_standard_vars(context: &TeraContext, vars: &StandardVars) -> TeraContext {
    let mut full = context.clone();
    full.insert("site", &vars.settings);
    full.insert("request_path", &vars.request_path);
    full.insert("year", &vars.year);
    full
}

fn collect_templates(base: &Path, dir: &Path, out: &mut Vec<(String, String)>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates(base, &path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let name = path
                .strip_prefix(base)
                .context("Template outside of templates directory")?
                .to_string_lossy()
                .replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            out.push((name, content));
        }
    }
    Ok(())
}

/// Tera errors keep the useful part in their sources
fn chain(e: &tera::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    msg
}

fn simple_error_page(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Error</title>
</head>
<body style="font-family: sans-serif; max-width: 600px; margin: 50px auto;">
    <h1>Something went wrong</h1>
    <pre>{}</pre>
</body>
</html>"#,
        tera::escape_html(error)
    )
}
