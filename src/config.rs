use anyhow::Context;
use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::sheet::transform::Transform;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub routes: RouteConfig,
    pub cors_origins: Vec<String>,
    pub output_dir: PathBuf,
    pub output_file_name: String,
    pub max_upload_bytes: usize,
    pub transform: Transform,
    pub task_ttl: Option<Duration>,
    pub sweep_interval: Duration,
}

/// Paths of the three task operations, without leading or trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub process: String,
    pub progress: String,
    pub download: String,
}

/// Route map shipped next to the frontend, e.g. `{"ip_server": "...", "rt_progress": "..."}`.
#[derive(Debug, Default, Deserialize)]
struct AssetsFile {
    ip_server: Option<String>,
    rt_process_excel: Option<String>,
    rt_progress: Option<String>,
    rt_download: Option<String>,
}

trait FromEnvWithDefault: Sized {
    fn from_env_or_default(key: &str, default: Self) -> Self;
}

impl FromEnvWithDefault for u16 {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for u64 {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for usize {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}

impl FromEnvWithDefault for String {
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key).unwrap_or(default)
    }
}

impl<T> FromEnvWithDefault for Option<T>
where
    T: FromStr,
{
    fn from_env_or_default(key: &str, default: Self) -> Self {
        env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .or(default)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}

fn normalize_route(route: &str) -> String {
    route.trim().trim_matches('/').to_string()
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            process: "process_excel".into(),
            progress: "progress".into(),
            download: "download".into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            routes: RouteConfig::default(),
            cors_origins: vec![],
            output_dir: env::temp_dir().join("sheet-progress"),
            output_file_name: "filtered.xlsx".into(),
            max_upload_bytes: 32 * 1024 * 1024,
            transform: Transform::Filter {
                column: "LIVRO".into(),
                return_columns: vec!["CONC".into(), "UC".into()],
            },
            task_ttl: Some(Duration::from_secs(3600)),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        let routes = RouteConfig {
            process: normalize_route(&String::from_env_or_default(
                "ROUTE__PROCESS",
                default.routes.process,
            )),
            progress: normalize_route(&String::from_env_or_default(
                "ROUTE__PROGRESS",
                default.routes.progress,
            )),
            download: normalize_route(&String::from_env_or_default(
                "ROUTE__DOWNLOAD",
                default.routes.download,
            )),
        };

        let transform = match String::from_env_or_default("TRANSFORM", "filter".into())
            .to_lowercase()
            .as_str()
        {
            "append" => Transform::AppendColumn {
                column: String::from_env_or_default("APPEND__COLUMN", "numero".into()),
            },
            other => {
                if other != "filter" {
                    tracing::warn!("unknown TRANSFORM `{}`, falling back to filter", other);
                }
                Transform::Filter {
                    column: String::from_env_or_default("FILTER__COLUMN", "LIVRO".into()),
                    return_columns: split_list(&String::from_env_or_default(
                        "FILTER__RETURN_COLUMNS",
                        "CONC,UC".into(),
                    )),
                }
            }
        };

        let ttl_secs = u64::from_env_or_default("TASK__TTL_SECS", 3600);

        Self {
            host: String::from_env_or_default("HOST", default.host),
            port: u16::from_env_or_default("PORT", default.port),
            routes,
            cors_origins: split_list(&String::from_env_or_default("CORS_ORIGINS", String::new())),
            output_dir: Option::<PathBuf>::from_env_or_default("OUTPUT_DIR", None)
                .unwrap_or(default.output_dir),
            output_file_name: String::from_env_or_default(
                "OUTPUT_FILE_NAME",
                default.output_file_name,
            ),
            max_upload_bytes: usize::from_env_or_default(
                "MAX_UPLOAD_BYTES",
                default.max_upload_bytes,
            ),
            transform,
            task_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            sweep_interval: Duration::from_secs(
                u64::from_env_or_default("TASK__SWEEP_INTERVAL_SECS", 60).max(1),
            ),
        }
    }

    /// Apply the JSON route map named by `ASSETS_FILE`, if any.
    pub async fn with_assets_from_env(self) -> anyhow::Result<Self> {
        match env::var("ASSETS_FILE") {
            Ok(path) => self.with_assets_file(path).await,
            Err(_) => Ok(self),
        }
    }

    pub async fn with_assets_file(mut self, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json_str = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read assets file {}", path.display()))?;
        let assets: AssetsFile = serde_json::from_str(&json_str)
            .with_context(|| format!("invalid assets file {}", path.display()))?;

        if let Some(host) = assets.ip_server {
            self.host = host;
        }
        if let Some(route) = assets.rt_process_excel {
            self.routes.process = normalize_route(&route);
        }
        if let Some(route) = assets.rt_progress {
            self.routes.progress = normalize_route(&route);
        }
        if let Some(route) = assets.rt_download {
            self.routes.download = normalize_route(&route);
        }

        Ok(self)
    }
}
