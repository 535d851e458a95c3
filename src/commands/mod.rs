//! CLI commands implementation

pub mod ingest;
pub mod init;
pub mod query;
pub mod remove;
pub mod status;

pub use ingest::*;
pub use init::*;
pub use query::*;
pub use remove::*;
pub use status::*;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::Config;
    use crate::index::{LocalIndex, VectorIndex};
    use crate::meta::MetaDb;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    pub struct TestEnv {
        pub config: Config,
        pub db: MetaDb,
        pub index: Arc<dyn VectorIndex>,
        pub corpus: PathBuf,
        _tmp: TempDir,
    }

    /// Fresh config, registry, index and an empty corpus directory
    pub async fn setup_test_env() -> TestEnv {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().join("data")));
        config.embedding.backend = "hashing".to_string();
        config.generator.enabled = false;

        let db = MetaDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        let index: Arc<dyn VectorIndex> = Arc::new(LocalIndex::from_config(&config).await.unwrap());

        let corpus = tmp.path().join("corpus");
        std::fs::create_dir_all(&corpus).unwrap();

        TestEnv {
            config,
            db,
            index,
            corpus,
            _tmp: tmp,
        }
    }

    pub fn write_file(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}
