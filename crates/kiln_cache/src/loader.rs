//! Per-file glue between the cache, the recipe parser and the indices.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use kiln_common::{FileDepend, VirtualName};
use kiln_config::ConfigData;
use tracing::debug;

use crate::error::CacheError;
use crate::index::IndexBuilder;
use crate::metadata::MetadataStore;
use crate::parser::Parser;
use crate::snapshot::{Field, RecipeSnapshot};
use crate::store::ValidityStore;

/// What happened when loading one recipe file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// The cached snapshots were valid and the file was not parsed.
    pub cached: bool,
    /// Variants withheld from the indices because the parser skipped them.
    pub skipped: usize,
    /// Variants added to the indices.
    pub indexed: usize,
}

/// Loads recipe files through the cache for one build run.
///
/// Borrows the run's store, indices, parser and configuration; files are
/// parsed only when their cached snapshots fail validation.
pub struct RecipeLoader<'a, P: Parser> {
    store: &'a mut ValidityStore,
    index: &'a mut IndexBuilder,
    parser: &'a P,
    config: &'a ConfigData,
}

impl<'a, P: Parser> RecipeLoader<'a, P> {
    /// Creates a loader over the given run state.
    pub fn new(
        store: &'a mut ValidityStore,
        index: &'a mut IndexBuilder,
        parser: &'a P,
        config: &'a ConfigData,
    ) -> Self {
        Self {
            store,
            index,
            parser,
            config,
        }
    }

    /// Loads one recipe file and indexes every variant it declares.
    ///
    /// The file is parsed only if its cached snapshots are not valid. Skipped
    /// variants are counted but not indexed. A parser failure, or parser
    /// output missing a declared variant, evicts the file and its variants
    /// from the cache and is returned without touching the indices.
    pub fn load_data(
        &mut self,
        real_path: &Path,
        appends: &[PathBuf],
    ) -> Result<LoadOutcome, CacheError> {
        let base = VirtualName::base(real_path.to_string_lossy())?;

        if !self.store.is_checked(&base) {
            self.store.cache_valid_update(&base);
        }
        let cached = self.store.cache_valid(&base);
        if !cached {
            debug!("Parsing {}", real_path.display());
            self.parse_into_store(real_path, &base, appends)?;
        }

        let variants = self
            .store
            .get(&base)
            .map(|info| info.variants.clone())
            .ok_or_else(|| CacheError::MissingVariant {
                name: base.encode(),
            })?;

        let mut outcome = LoadOutcome {
            cached,
            ..Default::default()
        };
        for variant in &variants {
            let virtual_name = base.with_variant(variant)?;
            let info = self
                .store
                .get(&virtual_name)
                .ok_or_else(|| CacheError::MissingVariant {
                    name: virtual_name.encode(),
                })?;
            if info.is_skipped() {
                debug!("Skipping {virtual_name}");
                outcome.skipped += 1;
            } else {
                self.index.add_from_snapshot(&virtual_name, info);
                outcome.indexed += 1;
            }
        }
        Ok(outcome)
    }

    /// Parses the file and returns the complete metadata store of one variant,
    /// bypassing the cache.
    pub fn load_data_full(
        &self,
        name: &VirtualName,
        appends: &[PathBuf],
    ) -> Result<P::Store, CacheError> {
        let real_path = Path::new(name.real_path());
        debug!("Parsing {} (full)", real_path.display());
        let mut stores = self
            .parser
            .parse(real_path, appends, self.config)
            .map_err(|e| CacheError::Parse {
                path: real_path.to_path_buf(),
                reason: e.reason,
            })?;
        stores
            .remove(name.variant())
            .ok_or_else(|| CacheError::MissingVariant {
                name: name.encode(),
            })
    }

    /// Records a metadata store parsed elsewhere into both cache and indices.
    pub fn add<S: MetadataStore + ?Sized>(&mut self, name: &VirtualName, data: &S) {
        let info =
            RecipeSnapshot::from_metadata(Path::new(name.real_path()), data, self.store.mtimes());
        self.index.add_from_snapshot(name, &info);
        self.store.insert(name.clone(), info);
    }

    fn parse_into_store(
        &mut self,
        real_path: &Path,
        base: &VirtualName,
        appends: &[PathBuf],
    ) -> Result<(), CacheError> {
        let group = match self.parse_group(real_path, base, appends) {
            Ok(group) => group,
            Err(e) => {
                self.evict_group(base);
                return Err(e);
            }
        };

        // The base variant comes last, so it records the files read by every
        // variant.
        let mut depends: Vec<FileDepend> = Vec::new();
        let mut seen: HashSet<FileDepend> = HashSet::new();
        for (name, mut data) in group {
            for dep in data.file_depends() {
                if seen.insert(dep.clone()) {
                    depends.push(dep);
                }
            }
            if name.is_base() && !depends.is_empty() {
                data.set_file_depends(depends.clone());
            }
            let info = RecipeSnapshot::from_metadata(real_path, &data, self.store.mtimes());
            self.store.insert(name, info);
        }
        Ok(())
    }

    /// Parses a file into named stores, in descending tag order.
    ///
    /// Fails without side effects unless the output holds the base variant
    /// and every variant the base declares, all under valid names.
    fn parse_group(
        &self,
        real_path: &Path,
        base: &VirtualName,
        appends: &[PathBuf],
    ) -> Result<Vec<(VirtualName, P::Store)>, CacheError> {
        let stores = self
            .parser
            .parse(real_path, appends, self.config)
            .map_err(|e| CacheError::Parse {
                path: real_path.to_path_buf(),
                reason: e.reason,
            })?;

        let declared = stores
            .get("")
            .ok_or_else(|| CacheError::Parse {
                path: real_path.to_path_buf(),
                reason: "parser produced no base variant".to_string(),
            })?
            .get(Field::Variants.var())
            .unwrap_or_default();
        for tag in declared.split_whitespace() {
            if !stores.contains_key(tag) {
                return Err(CacheError::MissingVariant {
                    name: base.with_variant(tag)?.encode(),
                });
            }
        }

        stores
            .into_iter()
            .rev()
            .map(|(tag, data)| {
                base.with_variant(&tag)
                    .map(|name| (name, data))
                    .map_err(CacheError::from)
            })
            .collect()
    }

    /// Evicts a file and every variant it previously declared.
    fn evict_group(&mut self, base: &VirtualName) {
        let variants = self
            .store
            .get(base)
            .map(|info| info.variants.clone())
            .unwrap_or_default();
        let siblings = variants
            .iter()
            .filter(|v| !v.is_empty())
            .filter_map(|v| base.with_variant(v).ok());
        for name in siblings {
            self.store.remove(&name);
        }
        self.store.remove(base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    use kiln_common::{Mtime, MtimeSource};

    use crate::metadata::MapStore;
    use crate::parser::ParseError;

    #[derive(Default)]
    struct FakeMtimes(Mutex<HashMap<PathBuf, Mtime>>);

    impl MtimeSource for FakeMtimes {
        fn mtime(&self, path: &Path) -> Mtime {
            self.0.lock().unwrap().get(path).copied().unwrap_or(0)
        }
    }

    /// Returns the same variant stores on every call, or fails.
    struct ScriptedParser {
        stores: BTreeMap<String, MapStore>,
        fail: bool,
        calls: Cell<usize>,
    }

    impl ScriptedParser {
        fn new(stores: &[(&str, MapStore)]) -> Self {
            Self {
                stores: stores
                    .iter()
                    .map(|(tag, store)| (tag.to_string(), store.clone()))
                    .collect(),
                fail: false,
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(&[])
            }
        }
    }

    impl Parser for ScriptedParser {
        type Store = MapStore;

        fn parse(
            &self,
            _real_path: &Path,
            _appends: &[PathBuf],
            _config: &ConfigData,
        ) -> Result<BTreeMap<String, MapStore>, ParseError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(ParseError::new("unexpected token"));
            }
            Ok(self.stores.clone())
        }
    }

    fn config() -> ConfigData {
        kiln_config::load_config_from_str("").unwrap()
    }

    fn store() -> ValidityStore {
        ValidityStore::disabled(Arc::new(FakeMtimes::default()), "0.1.0")
    }

    fn foo() -> VirtualName {
        VirtualName::base("foo.bb").unwrap()
    }

    fn native() -> VirtualName {
        foo().with_variant("native").unwrap()
    }

    fn base_store() -> MapStore {
        MapStore::new()
            .with_var("PN", "foo")
            .with_var("PV", "1.0")
            .with_var("__VARIANTS", "native")
    }

    fn native_store() -> MapStore {
        MapStore::new().with_var("PN", "foo-native").with_var("PV", "1.0")
    }

    #[test]
    fn parses_and_indexes_every_variant() {
        let parser = ScriptedParser::new(&[("", base_store()), ("native", native_store())]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();

        let outcome = RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("foo.bb"), &[])
            .unwrap();

        assert_eq!(
            outcome,
            LoadOutcome {
                cached: false,
                skipped: 0,
                indexed: 2
            }
        );
        assert_eq!(parser.calls.get(), 1);
        assert_eq!(index.providers("foo"), &[foo()]);
        assert_eq!(index.providers("foo-native"), &[native()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn undelivered_declared_variant_leaves_nothing_behind() {
        let parser = ScriptedParser::new(&[
            ("", base_store().with_var("__VARIANTS", "native cross")),
            ("native", native_store()),
        ]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();

        let err = RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("foo.bb"), &[])
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "no snapshot for declared variant virtual:cross:foo.bb"
        );
        assert!(store.is_empty());
        assert!(!store.is_dirty());
        assert!(index.is_empty());
    }

    #[test]
    fn undelivered_declared_variant_evicts_previous_group() {
        let parser = ScriptedParser::new(&[("", base_store())]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();
        store.insert(
            foo(),
            RecipeSnapshot {
                variants: vec!["native".to_string(), String::new()],
                ..Default::default()
            },
        );
        store.insert(native(), RecipeSnapshot::default());

        let err = RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("foo.bb"), &[])
            .unwrap_err();

        assert!(matches!(err, CacheError::MissingVariant { .. }));
        assert!(store.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn unusable_variant_tag_from_parser_is_rejected() {
        let parser = ScriptedParser::new(&[
            ("", base_store().with_var("__VARIANTS", "")),
            ("bad:tag", native_store()),
        ]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();

        let err = RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("foo.bb"), &[])
            .unwrap_err();

        assert!(matches!(err, CacheError::InvalidName(_)));
        assert!(store.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn path_that_reads_as_variant_is_rejected() {
        let parser = ScriptedParser::new(&[("", base_store())]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();

        let err = RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("virtual:native:foo.bb"), &[])
            .unwrap_err();

        assert!(matches!(err, CacheError::InvalidName(_)));
        assert_eq!(parser.calls.get(), 0);
    }

    #[test]
    fn base_records_files_read_by_all_variants() {
        let parser = ScriptedParser::new(&[
            ("", base_store().with_depend("a.inc", 1).with_depend("c.inc", 3)),
            ("native", native_store().with_depend("a.inc", 1).with_depend("b.inc", 2)),
        ]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();
        RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("foo.bb"), &[])
            .unwrap();

        let base = store.get(&foo()).unwrap();
        assert_eq!(
            base.file_depends,
            vec![
                FileDepend::new("a.inc", 1),
                FileDepend::new("b.inc", 2),
                FileDepend::new("c.inc", 3),
            ]
        );
        let native = store.get(&native()).unwrap();
        assert_eq!(native.file_depends.len(), 2);
    }

    #[test]
    fn skipped_variant_is_counted_not_indexed() {
        let parser = ScriptedParser::new(&[
            ("", base_store()),
            ("native", native_store().with_var("__SKIPPED", "incompatible host")),
        ]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();

        let outcome = RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("foo.bb"), &[])
            .unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.indexed, 1);
        assert!(index.providers("foo-native").is_empty());
        assert!(store.get(&native()).unwrap().is_skipped());
    }

    #[test]
    fn parse_failure_evicts_previous_group() {
        let parser = ScriptedParser::failing();
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();
        store.insert(
            foo(),
            RecipeSnapshot {
                variants: vec!["native".to_string(), String::new()],
                ..Default::default()
            },
        );
        store.insert(native(), RecipeSnapshot::default());

        let err = RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("foo.bb"), &[])
            .unwrap_err();

        assert!(matches!(err, CacheError::Parse { .. }));
        assert!(err.to_string().contains("unexpected token"));
        assert!(store.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn missing_base_variant_is_a_parse_error() {
        let parser = ScriptedParser::new(&[("native", native_store())]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();

        let err = RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .load_data(Path::new("foo.bb"), &[])
            .unwrap_err();
        assert!(err.to_string().contains("no base variant"));
        assert!(store.is_empty());
    }

    #[test]
    fn load_data_full_returns_requested_variant() {
        let parser = ScriptedParser::new(&[("", base_store()), ("native", native_store())]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();
        let loader = RecipeLoader::new(&mut store, &mut index, &parser, &config);

        let native = loader
            .load_data_full(&native(), &[])
            .unwrap();
        assert_eq!(native.get("PN").as_deref(), Some("foo-native"));

        let err = loader
            .load_data_full(&foo().with_variant("cross").unwrap(), &[])
            .unwrap_err();
        assert!(matches!(err, CacheError::MissingVariant { .. }));
        drop(loader);
        assert!(store.is_empty(), "full loads bypass the cache");
    }

    #[test]
    fn add_records_in_cache_and_indices() {
        let parser = ScriptedParser::new(&[]);
        let config = config();
        let mut store = store();
        let mut index = IndexBuilder::new();

        RecipeLoader::new(&mut store, &mut index, &parser, &config)
            .add(&foo(), &base_store().with_var("PROVIDES", "virtual/foo"));

        assert_eq!(store.get(&foo()).unwrap().name, "foo");
        assert_eq!(index.providers("virtual/foo"), &[foo()]);
        assert_eq!(parser.calls.get(), 0);
    }
}
