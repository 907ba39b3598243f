//! Registry of language plugins.

use crate::traits::LanguagePlugin;
use std::sync::{OnceLock, RwLock};

/// Global plugin registry.
static PLUGINS: RwLock<Vec<&'static dyn LanguagePlugin>> = RwLock::new(Vec::new());
static PLUGINS_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Register a custom plugin. A plugin for a language that is already
/// registered shadows the earlier one.
pub fn register_plugin(plugin: &'static dyn LanguagePlugin) {
    init_plugins();
    PLUGINS.write().unwrap().insert(0, plugin);
}

fn init_plugins() {
    PLUGINS_INITIALIZED.get_or_init(|| {
        let mut plugins = PLUGINS.write().unwrap();
        #[cfg(feature = "target-perl")]
        {
            plugins.push(&crate::output::perl::PERL_PLUGIN);
        }
        #[cfg(feature = "target-ruby")]
        {
            plugins.push(&crate::output::ruby::RUBY_PLUGIN);
        }
        tracing::debug!(count = plugins.len(), "registered built-in plugins");
    });
}

/// Get a plugin by language name (`"perl"`, `"ruby"`).
pub fn plugin_for_language(lang: &str) -> Option<&'static dyn LanguagePlugin> {
    init_plugins();
    PLUGINS
        .read()
        .unwrap()
        .iter()
        .find(|p| p.info().language.eq_ignore_ascii_case(lang))
        .copied()
}

/// Get a plugin by the extension of the files it generates, with or
/// without the leading dot.
pub fn plugin_for_extension(ext: &str) -> Option<&'static dyn LanguagePlugin> {
    init_plugins();
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    PLUGINS
        .read()
        .unwrap()
        .iter()
        .find(|p| p.info().extension == ext)
        .copied()
}

/// Get all registered plugins, most recently registered first.
pub fn plugins() -> Vec<&'static dyn LanguagePlugin> {
    init_plugins();
    PLUGINS.read().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::GenerationOptions;
    use crate::traits::{Generated, PluginInfo, TransformError};
    use serde_json::Value;

    struct Echo;

    const ECHO_INFO: PluginInfo = PluginInfo {
        name: "Echo",
        language: "echo",
        extension: "echo",
        icon: "",
        mime_type: "text/plain",
        version: "1",
    };

    impl LanguagePlugin for Echo {
        fn info(&self) -> &PluginInfo {
            &ECHO_INFO
        }

        fn generate_code(
            &self,
            ast: &Value,
            _options: &GenerationOptions,
        ) -> Result<Generated, TransformError> {
            Ok(Generated {
                code: ast.to_string(),
                ..Generated::default()
            })
        }

        fn install_hint(&self) -> &'static str {
            ""
        }
    }

    static ECHO: Echo = Echo;

    #[test]
    #[cfg(feature = "target-perl")]
    fn test_perl_lookup() {
        let plugin = plugin_for_language("perl").expect("perl plugin");
        assert_eq!(plugin.info().extension, "pl");
        let plugin = plugin_for_extension(".pl").expect("pl extension");
        assert_eq!(plugin.info().language, "perl");
    }

    #[test]
    #[cfg(feature = "target-ruby")]
    fn test_ruby_lookup() {
        let plugin = plugin_for_language("Ruby").expect("ruby plugin");
        assert_eq!(plugin.info().language, "ruby");
        let plugin = plugin_for_extension("rb").expect("rb extension");
        assert_eq!(plugin.info().name, "Ruby");
    }

    #[test]
    fn test_unknown_language() {
        assert!(plugin_for_language("cobol").is_none());
        assert!(plugin_for_extension("cbl").is_none());
    }

    #[test]
    fn test_register_custom_plugin() {
        register_plugin(&ECHO);
        let plugin = plugin_for_language("echo").expect("echo plugin");
        let result = plugin.generate(&serde_json::json!(1), &GenerationOptions::default());
        assert!(result.success);
        assert_eq!(result.code, "1");
        assert!(plugins().iter().any(|p| p.info().language == "echo"));
    }
}
