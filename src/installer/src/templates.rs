/// Embedded templates for the text the installer writes into host files.
/// Rendered with Tera so the block format lives in one place.
use crate::error::{InstallerError, Result};
use tera::{Context, Tera};

pub const RUNTIME_BLOCK: &str = "containerd/runtime-block.toml";

/// Registration block appended to the containerd config. The leading newline
/// keeps the block separate from whatever the file ended with.
const RUNTIME_BLOCK_TEMPLATE: &str = r#"
# runtime config for {{ runtime_name }}
[plugins."io.containerd.grpc.v1.cri".containerd.runtimes.{{ runtime_name }}]
runtime_type = "{{ shim_path }}"
"#;

pub const ALL_TEMPLATES: &[(&str, &str)] = &[(RUNTIME_BLOCK, RUNTIME_BLOCK_TEMPLATE)];

pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn from_embedded() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(ALL_TEMPLATES.iter().copied())
            .map_err(|e| InstallerError::Template(format!("Failed to load templates: {}", e)))?;
        tera.autoescape_on(vec![]);
        Ok(Self { tera })
    }

    pub fn render_runtime_block(&self, runtime_name: &str, shim_path: &str) -> Result<String> {
        let mut context = Context::new();
        context.insert("runtime_name", runtime_name);
        context.insert("shim_path", shim_path);

        self.tera.render(RUNTIME_BLOCK, &context).map_err(|e| {
            InstallerError::Template(format!("Failed to render template {}: {}", RUNTIME_BLOCK, e))
        })
    }
}
