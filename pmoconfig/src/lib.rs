//! # pmoconfig - Configuration YAML de PMOPlayout
//!
//! Les réglages viennent, par ordre de priorité croissante :
//! 1. de la configuration par défaut embarquée (`pmoplayout.yaml`)
//! 2. du fichier `config.yaml` du répertoire de configuration
//! 3. des variables d'environnement `PMOPLAYOUT_CONFIG__<SECTION>__<CLE>`
//!
//! Le résultat fusionné est réécrit dans `config.yaml` au chargement, puis à
//! chaque appel d'un setter.
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config();
//! let delay = config.get_timeline_flush_delay_ms()?;
//! let data_dir = config.get_managed_dir(&["playout", "storage", "directory"], "data")?;
//! config.set_force_now_time(true)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result, anyhow};
use lazy_static::lazy_static;
use serde::{Serialize, de::DeserializeOwned};
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

const DEFAULT_CONFIG: &str = include_str!("pmoplayout.yaml");

const ENV_CONFIG_DIR: &str = "PMOPLAYOUT_CONFIG";
const ENV_PREFIX: &str = "PMOPLAYOUT_CONFIG__";
const LOCAL_DIR_NAME: &str = ".pmoplayout";
const CONFIG_FILE_NAME: &str = "config.yaml";

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load PMOPlayout configuration"));
}

/// Génère un couple getter/setter typé pour une clé de configuration
///
/// Une valeur absente ou du mauvais type donne la valeur par défaut.
macro_rules! config_accessor {
    ($getter:ident, $setter:ident, $ty:ty, [$($key:literal),+], $default:expr) => {
        pub fn $getter(&self) -> Result<$ty> {
            Ok(self.get_typed::<$ty>(&[$($key),+]).unwrap_or($default))
        }

        pub fn $setter(&self, value: $ty) -> Result<()> {
            self.set_typed(&[$($key),+], value)
        }
    };
}

/// Configuration partagée du moteur de playout
///
/// L'arbre YAML est gardé en mémoire derrière un mutex ; toutes les clés
/// sont en minuscules.
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Répertoire candidat : argument, variable d'environnement, `.pmoplayout`
    /// local puis dans le répertoire personnel
    fn find_config_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Using config directory from environment");
            return PathBuf::from(env_path);
        }

        let local = PathBuf::from(LOCAL_DIR_NAME);
        let home = dirs::home_dir().map(|h| h.join(LOCAL_DIR_NAME));
        [Some(local.clone()), home]
            .into_iter()
            .flatten()
            .find(|p| p.is_dir())
            .unwrap_or(local)
    }

    /// Détermine le répertoire de configuration et vérifie qu'il est inscriptible
    pub fn config_dir(directory: &str) -> Result<PathBuf> {
        let dir = Self::find_config_dir(directory);
        fs::create_dir_all(&dir).with_context(|| format!("Cannot create config directory {}", dir.display()))?;
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }

        let marker = dir.join(".write_test");
        fs::write(&marker, b"pmoplayout")
            .with_context(|| format!("Config directory {} is not writable", dir.display()))?;
        fs::remove_file(&marker)?;
        Ok(dir)
    }

    /// Charge la configuration depuis `directory` (ou le répertoire par défaut)
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        let path = config_dir.join(CONFIG_FILE_NAME);
        info!(config_dir = %config_dir.display(), "Using config directory");

        let mut data: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        match fs::read(&path) {
            Ok(bytes) => {
                let external: Value = serde_yaml::from_slice(&bytes)
                    .with_context(|| format!("Invalid YAML in {}", path.display()))?;
                merge_yaml(&mut data, &external);
                info!(config_file = %path.display(), "Loaded config file");
            }
            Err(_) => info!(config_file = %path.display(), "No config file, using embedded defaults"),
        }

        let mut data = lowercase_keys(data);
        apply_env_overrides(&mut data);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(data),
        };
        config.save()?;
        Ok(config)
    }

    /// Répertoire de configuration effectivement utilisé
    pub fn directory(&self) -> &Path {
        &self.config_dir
    }

    fn data(&self) -> Result<MutexGuard<'_, Value>> {
        self.data.lock().map_err(|_| anyhow!("Configuration lock poisoned"))
    }

    /// Réécrit `config.yaml` avec l'état courant
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data()?)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Écrit une valeur au chemin donné, en créant les sections manquantes,
    /// puis sauvegarde
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        set_at(&mut *self.data()?, path, value)?;
        self.save()
    }

    /// Lit la valeur au chemin donné ; erreur si une section manque
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        get_at(&*self.data()?, path).cloned()
    }

    fn get_typed<T: DeserializeOwned>(&self, path: &[&str]) -> Option<T> {
        let value = self.get_value(path).ok()?;
        match serde_yaml::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %path.join("."), "Ignoring config value of unexpected type: {}", e);
                None
            }
        }
    }

    fn set_typed<T: Serialize>(&self, path: &[&str], value: T) -> Result<()> {
        self.set_value(path, serde_yaml::to_value(value)?)
    }

    /// Répertoire géré par la configuration, créé au besoin
    ///
    /// Un chemin relatif est résolu par rapport au répertoire de
    /// configuration. Si la clé est absente, `default` y est enregistré.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let configured = match self.get_value(path) {
            Ok(Value::String(s)) => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };

        let dir = Path::new(&configured);
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.config_dir.join(dir)
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(directory = %dir.display(), "Created managed directory");
        }
        Ok(dir.to_string_lossy().into_owned())
    }

    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    // Journalisation
    config_accessor!(get_log_min_level, set_log_min_level, String, ["host", "logger", "min_level"], "INFO".to_string());
    config_accessor!(get_log_enable_console, set_log_enable_console, bool, ["host", "logger", "enable_console"], true);

    // Cache
    config_accessor!(
        get_timeline_flush_delay_ms,
        set_timeline_flush_delay_ms,
        u64,
        ["playout", "cache", "timeline_flush_delay_ms"],
        2
    );
    config_accessor!(get_cache_production, set_cache_production, bool, ["playout", "cache", "production"], false);

    // Horloge du studio
    config_accessor!(get_force_now_time, set_force_now_time, bool, ["playout", "studio", "force_now_time"], false);
    config_accessor!(
        get_now_safe_latency_ms,
        set_now_safe_latency_ms,
        u64,
        ["playout", "studio", "now_safe_latency_ms"],
        0
    );

    // Workers
    config_accessor!(
        get_worker_queue_capacity,
        set_worker_queue_capacity,
        usize,
        ["playout", "worker", "queue_capacity"],
        256
    );
}

/// Instance globale, chargée au premier accès
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn get_at<'a>(data: &'a Value, path: &[&str]) -> Result<&'a Value> {
    path.iter().enumerate().try_fold(data, |node, (i, key)| match node {
        Value::Mapping(map) => map
            .get(Value::String(key.to_lowercase()))
            .ok_or_else(|| anyhow!("Path {} does not exist", path[..=i].join("."))),
        _ => Err(anyhow!("Path {} is not a section", path[..i].join("."))),
    })
}

fn set_at(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        *data = value;
        return Ok(());
    };
    let Value::Mapping(map) = data else {
        return Err(anyhow!("Cannot set {}: parent is not a section", first));
    };
    let key = Value::String(first.to_lowercase());
    if rest.is_empty() {
        map.insert(key, value);
        Ok(())
    } else {
        set_at(map.entry(key).or_insert(Value::Mapping(Mapping::new())), rest, value)
    }
}

/// `PMOPLAYOUT_CONFIG__PLAYOUT__CACHE__PRODUCTION=true` écrit `playout.cache.production`
fn apply_env_overrides(data: &mut Value) {
    for (key, raw) in env::vars() {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<&str> = stripped.split("__").collect();
        // valeur YAML si elle se parse, sinon chaîne brute
        let value = serde_yaml::from_str::<Value>(&raw).unwrap_or(Value::String(raw.clone()));
        match set_at(data, &path, value) {
            Ok(()) => debug!(key = %key, "Applied environment override"),
            Err(e) => warn!(key = %key, "Ignoring environment override: {}", e),
        }
    }
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lowercase_keys(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Fusionne `external` dans `default` : les sections sont fusionnées clé par
/// clé, les scalaires et les séquences sont remplacés
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
