//! Template rendering for the `View` mode.
//!
//! The middleware only depends on the [`Renderer`] trait. [`FileRenderer`] is
//! the default implementation: it resolves `.html` files from theme, plugin
//! and application directories and falls back to templates compiled into the
//! crate.
//!
//! Directory layout below each search root:
//!
//! ```text
//! <root>/<templatePath>/<template>.html
//! <root>/layout/<layoutPath>/<layout>.html
//! ```
//!
//! Theme and plugin roots are `<plugins>/<Name>/templates`.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::ViewOptions;

/// Variables available to templates as `{{ name }}`.
pub type ViewData = BTreeMap<String, String>;

/// Placeholder a layout uses to embed the rendered template.
pub const CONTENT_KEY: &str = "content";

pub const DEFAULT_TEMPLATE: &str = "maintenance";
pub const DEFAULT_TEMPLATE_PATH: &str = "Maintenance";
pub const DEFAULT_LAYOUT: &str = "maintenance";
pub const DEFAULT_LAYOUT_PATH: &str = "Maintenance";

const TEMPLATE_EXT: &str = "html";
const LAYOUT_DIR: &str = "layout";

/// Templates shipped with the crate, keyed by path relative to a search root.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "Maintenance/maintenance.html",
        include_str!("../templates/Maintenance/maintenance.html"),
    ),
    (
        "layout/Maintenance/maintenance.html",
        include_str!("../templates/layout/Maintenance/maintenance.html"),
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{kind} `{name}` could not be found (searched: {searched:?})")]
    MissingTemplate {
        kind: &'static str,
        name: String,
        searched: Vec<PathBuf>,
    },

    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A fully resolved template selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSpec {
    pub template: String,
    pub template_path: String,
    /// `None` renders the template without a layout.
    pub layout: Option<String>,
    pub layout_path: String,
    pub plugin: Option<String>,
    pub theme: Option<String>,
}

impl Default for ViewSpec {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            template_path: DEFAULT_TEMPLATE_PATH.to_string(),
            layout: Some(DEFAULT_LAYOUT.to_string()),
            layout_path: DEFAULT_LAYOUT_PATH.to_string(),
            plugin: None,
            theme: None,
        }
    }
}

impl ViewSpec {
    /// Fill unset options with the built-in defaults. An empty `layout`
    /// disables the layout.
    pub fn from_options(options: &ViewOptions) -> Self {
        let defaults = Self::default();
        Self {
            template: options.template.clone().unwrap_or(defaults.template),
            template_path: options
                .template_path
                .clone()
                .unwrap_or(defaults.template_path),
            layout: match options.layout.as_deref() {
                Some("") => None,
                Some(layout) => Some(layout.to_string()),
                None => defaults.layout,
            },
            layout_path: options.layout_path.clone().unwrap_or(defaults.layout_path),
            plugin: options.plugin.clone().filter(|p| !p.is_empty()),
            theme: options.theme.clone().filter(|t| !t.is_empty()),
        }
    }
}

/// Turns a template selection plus data into response text.
pub trait Renderer: Send + Sync {
    fn render(&self, view: &ViewSpec, data: &ViewData) -> Result<String, RenderError>;
}

/// Renders `.html` templates from disk with `{{ name }}` interpolation.
#[derive(Debug, Clone)]
pub struct FileRenderer {
    templates: PathBuf,
    plugins: PathBuf,
}

impl FileRenderer {
    pub fn new(templates: impl Into<PathBuf>, plugins: impl Into<PathBuf>) -> Self {
        Self {
            templates: templates.into(),
            plugins: plugins.into(),
        }
    }

    /// Search roots for `name`, in precedence order: theme, plugin, app.
    ///
    /// A `Plugin.name` prefix selects the plugin for this lookup only and
    /// takes priority over the `plugin` option.
    fn search_roots<'a>(&self, view: &ViewSpec, name: &'a str) -> (Vec<PathBuf>, &'a str) {
        let (prefixed, base) = split_plugin(name);
        let mut roots = Vec::with_capacity(3);
        if let Some(theme) = &view.theme {
            roots.push(self.plugin_root(theme));
        }
        if let Some(plugin) = prefixed.or(view.plugin.as_deref()) {
            roots.push(self.plugin_root(plugin));
        }
        roots.push(self.templates.clone());
        (roots, base)
    }

    fn plugin_root(&self, plugin: &str) -> PathBuf {
        self.plugins.join(plugin).join("templates")
    }

    fn load(&self, kind: &'static str, view: &ViewSpec, dir: &Path, name: &str) -> Result<String, RenderError> {
        let (roots, base) = self.search_roots(view, name);
        let relative = dir.join(format!("{base}.{TEMPLATE_EXT}"));

        let mut searched = Vec::with_capacity(roots.len());
        for root in roots {
            let path = root.join(&relative);
            match std::fs::read_to_string(&path) {
                Ok(source) => {
                    tracing::debug!(path = %path.display(), kind, "Template resolved");
                    return Ok(source);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => searched.push(path),
                Err(source) => return Err(RenderError::Io { path, source }),
            }
        }

        builtin(&relative).map(str::to_string).ok_or_else(|| RenderError::MissingTemplate {
            kind,
            name: name.to_string(),
            searched,
        })
    }
}

impl Renderer for FileRenderer {
    fn render(&self, view: &ViewSpec, data: &ViewData) -> Result<String, RenderError> {
        let template = self.load("template", view, Path::new(&view.template_path), &view.template)?;
        let content = interpolate(&template, data);

        let Some(layout_name) = &view.layout else {
            return Ok(content);
        };
        let layout_dir = Path::new(LAYOUT_DIR).join(&view.layout_path);
        let layout = self.load("layout", view, &layout_dir, layout_name)?;

        let mut layout_data = data.clone();
        layout_data.insert(CONTENT_KEY.to_string(), content);
        Ok(interpolate(&layout, &layout_data))
    }
}

fn builtin(relative: &Path) -> Option<&'static str> {
    let key = relative.to_str()?.replace('\\', "/");
    BUILTIN_TEMPLATES
        .iter()
        .find(|(path, _)| *path == key)
        .map(|(_, source)| *source)
}

/// `"Plugin.name"` -> `(Some("Plugin"), "name")`.
fn split_plugin(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((plugin, base)) if !plugin.is_empty() && !base.is_empty() => (Some(plugin), base),
        _ => (None, name),
    }
}

/// Replace `{{ key }}` placeholders with values from `data`.
///
/// Single pass: substituted values are not scanned again. Unknown keys are
/// left in place.
pub fn interpolate(source: &str, data: &ViewData) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match data.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
