use serde::Serialize;

use crate::domain::GeoSeriesAccession;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachePlan {
    pub bundle_cached: bool,
    pub results_cached: bool,
}

impl CachePlan {
    /// Acquisition can be skipped when either artifact is present.
    pub fn skip_acquisition(&self) -> bool {
        self.bundle_cached || self.results_cached
    }

    pub fn skip_analysis(&self) -> bool {
        self.results_cached
    }
}

pub struct CacheGate<'a> {
    store: &'a Store,
    accession: &'a GeoSeriesAccession,
}

impl<'a> CacheGate<'a> {
    pub fn new(store: &'a Store, accession: &'a GeoSeriesAccession) -> Self {
        Self { store, accession }
    }

    pub fn plan(&self) -> CachePlan {
        CachePlan {
            bundle_cached: self.store.exists(&self.store.bundle_path(self.accession)),
            results_cached: self.store.exists(&self.store.summary_path(self.accession)),
        }
    }

    /// Plan for a run that ignores every cached artifact.
    pub fn bypass() -> CachePlan {
        CachePlan {
            bundle_cached: false,
            results_cached: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn plan_follows_files_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new_with_root(root);
        let acc: GeoSeriesAccession = "GSE42".parse().unwrap();
        let gate = CacheGate::new(&store, &acc);

        let plan = gate.plan();
        assert!(!plan.skip_acquisition());
        assert!(!plan.skip_analysis());

        Store::write_bytes_atomic(&store.bundle_path(&acc), b"{}").unwrap();
        let plan = gate.plan();
        assert!(plan.bundle_cached);
        assert!(plan.skip_acquisition());
        assert!(!plan.skip_analysis());

        Store::write_bytes_atomic(&store.summary_path(&acc), b"{}").unwrap();
        assert!(gate.plan().skip_analysis());
    }
}
