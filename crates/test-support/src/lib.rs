pub mod fixtures {
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    pub fn root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("tests")
            .join("fixtures")
    }

    pub fn path(relative: impl AsRef<Path>) -> PathBuf {
        root().join(relative.as_ref())
    }

    pub fn read(relative: impl AsRef<Path>) -> io::Result<String> {
        fs::read_to_string(path(relative))
    }

    pub fn stanza(name: &str) -> String {
        read_or_panic(Path::new("stanzas").join(name))
    }

    /// A stanza fixture with its `subscribe-1` id swapped for `id`.
    pub fn stanza_with_id(name: &str, id: &str) -> String {
        stanza(name).replace("subscribe-1", id)
    }

    pub fn config(name: &str) -> String {
        read_or_panic(Path::new("config").join(name))
    }

    fn read_or_panic(relative: impl AsRef<Path>) -> String {
        let relative = relative.as_ref();
        read(relative).unwrap_or_else(|error| {
            panic!(
                "failed to read fixture {}: {error}",
                relative.to_string_lossy()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;

    #[test]
    fn fixture_root_exists() {
        assert!(fixtures::root().is_dir());
    }

    #[test]
    fn loads_stanza_fixture() {
        let stanza = fixtures::stanza("iq-error.xml");
        assert!(stanza.contains("<iq"));
        assert!(stanza.contains("error-condition"));
    }

    #[test]
    fn stanza_with_id_rewrites_id() {
        let stanza = fixtures::stanza_with_id("subscribe-basic.xml", "abc-123");
        assert!(stanza.contains("id='abc-123'"));
        assert!(!stanza.contains("subscribe-1"));
    }

    #[test]
    fn loads_config_fixture() {
        let config = fixtures::config("bridge.toml");
        let toml: toml::Value =
            toml::from_str(&config).expect("bridge.toml should be valid toml");
        assert!(toml.is_table());
    }
}
