//! Redis-backed cache store.
//!
//! # Responsibilities
//! - Parse store URLs for standalone, sentinel and cluster deployments
//! - Hold one reconnecting connection per store and share it between requests
//! - Map `CacheStore` get/set onto `GET` and `SET .. EX`
//!
//! # URL forms
//! ```text
//! redis://[:password@]host:port[/db]
//! rediss://[:password@]host:port[/db]
//! redis+sentinel://[:password@]s1:26379,s2:26379/[service_name:]mymaster
//! redis+cluster://[:password@]n1:6379,n2:6379
//! ```
//! `sentinel://` and `cluster://` are accepted as short forms. A leading
//! `http://` or `https://` is stripped before parsing.
//!
//! # Design Decisions
//! - Every operation is bounded by a short timeout; a slow store is a miss
//! - The password applies to the data nodes, never to the sentinels

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::{AsyncCommands, RedisConnectionInfo, RedisResult};
use tokio::sync::Mutex;

use crate::cache::store::{CacheStore, StoreFuture};
use crate::cache::CacheError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const OPERATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Deployment topology named by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisMode {
    Standalone,
    Sentinel,
    Cluster,
}

/// A parsed store URL.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisUrl {
    pub mode: RedisMode,
    pub tls: bool,
    pub hosts: Vec<String>,
    pub password: Option<String>,
    pub db: i64,
    /// Master name, sentinel mode only.
    pub service_name: Option<String>,
}

impl RedisUrl {
    /// Host list without credentials, for logs.
    pub fn target(&self) -> String {
        self.hosts.join(",")
    }

    fn node_url(&self, host: &str, db: Option<i64>) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let auth = match &self.password {
            Some(password) => format!(":{password}@"),
            None => String::new(),
        };
        match db {
            Some(db) => format!("{scheme}://{auth}{host}/{db}"),
            None => format!("{scheme}://{auth}{host}"),
        }
    }

    async fn open(&self) -> Result<Backend, CacheError> {
        match self.mode {
            RedisMode::Standalone => {
                let client =
                    redis::Client::open(self.node_url(&self.hosts[0], Some(self.db))).map_err(CacheError::store)?;
                let manager = ConnectionManager::new(client).await.map_err(CacheError::store)?;
                Ok(Backend::Standalone(manager))
            }
            RedisMode::Cluster => {
                let nodes: Vec<String> = self.hosts.iter().map(|host| self.node_url(host, None)).collect();
                let client = ClusterClient::new(nodes).map_err(CacheError::store)?;
                let connection = client.get_async_connection().await.map_err(CacheError::store)?;
                Ok(Backend::Cluster(connection))
            }
            RedisMode::Sentinel => {
                let sentinels: Vec<String> = self.hosts.iter().map(|host| format!("redis://{host}")).collect();
                let master = SentinelNodeConnectionInfo {
                    redis_connection_info: Some(RedisConnectionInfo {
                        db: self.db,
                        password: self.password.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                let mut client = SentinelClient::build(
                    sentinels,
                    self.service_name.clone().unwrap_or_default(),
                    Some(master),
                    SentinelServerType::Master,
                )
                .map_err(CacheError::store)?;

                // Resolve the master once so a wrong service name fails at startup.
                client.get_async_connection().await.map_err(CacheError::store)?;
                Ok(Backend::Sentinel(Mutex::new(client)))
            }
        }
    }
}

impl fmt::Debug for RedisUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisUrl")
            .field("mode", &self.mode)
            .field("tls", &self.tls)
            .field("hosts", &self.hosts)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("service_name", &self.service_name)
            .finish()
    }
}

impl FromStr for RedisUrl {
    type Err = CacheError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CacheError::Invalid(format!("redis url: {reason}"));

        let cleaned = raw
            .strip_prefix("http://")
            .or_else(|| raw.strip_prefix("https://"))
            .unwrap_or(raw);
        let (scheme, rest) = cleaned.split_once("://").unwrap_or(("redis", cleaned));

        let (mode, tls) = match scheme {
            "redis" => (RedisMode::Standalone, false),
            "rediss" => (RedisMode::Standalone, true),
            "redis+sentinel" | "sentinel" => (RedisMode::Sentinel, false),
            "redis+cluster" | "cluster" => (RedisMode::Cluster, false),
            other => return Err(invalid(&format!("unsupported scheme `{other}`"))),
        };

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let (userinfo, hosts) = match authority.rsplit_once('@') {
            Some((userinfo, hosts)) => (Some(userinfo), hosts),
            None => (None, authority),
        };
        let password = userinfo
            .and_then(|info| info.split_once(':'))
            .map(|(_, password)| password.to_string())
            .filter(|password| !password.is_empty());
        let hosts: Vec<String> = hosts
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(String::from)
            .collect();
        if hosts.is_empty() {
            return Err(invalid("no hosts"));
        }

        let path = path.trim_matches('/');
        let mut db = 0;
        let mut service_name = None;
        match mode {
            RedisMode::Standalone if !path.is_empty() => {
                db = path
                    .parse()
                    .map_err(|_| invalid(&format!("database `{path}` is not a number")))?;
            }
            RedisMode::Sentinel => {
                let name = path.rsplit_once("service_name:").map_or(path, |(_, name)| name);
                if name.is_empty() {
                    return Err(invalid("sentinel url needs a master name"));
                }
                service_name = Some(name.to_string());
            }
            _ => {}
        }

        Ok(Self {
            mode,
            tls,
            hosts,
            password,
            db,
            service_name,
        })
    }
}

enum Backend {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
    Sentinel(Mutex<SentinelClient>),
}

/// Cache store talking to Redis.
pub struct RedisStore {
    url: RedisUrl,
    backend: Backend,
}

impl RedisStore {
    /// Parse `raw` and connect. Fails if the store cannot be reached.
    pub async fn connect(raw: &str) -> Result<Self, CacheError> {
        let url: RedisUrl = raw.parse()?;
        let backend = tokio::time::timeout(CONNECT_TIMEOUT, url.open())
            .await
            .map_err(|_| CacheError::store(format!("timed out connecting to redis at {}", url.target())))??;

        tracing::info!(mode = ?url.mode, target = %url.target(), "Connected to redis cache store");
        Ok(Self { url, backend })
    }

    pub fn url(&self) -> &RedisUrl {
        &self.url
    }

    async fn fetch(&self, key: &str) -> RedisResult<Option<String>> {
        match &self.backend {
            Backend::Standalone(connection) => {
                let mut connection = connection.clone();
                connection.get(key).await
            }
            Backend::Cluster(connection) => {
                let mut connection = connection.clone();
                connection.get(key).await
            }
            Backend::Sentinel(client) => {
                let mut connection = client.lock().await.get_async_connection().await?;
                connection.get(key).await
            }
        }
    }

    async fn store(&self, key: &str, value: String, ttl: Duration) -> RedisResult<()> {
        match &self.backend {
            Backend::Standalone(connection) => write(&mut connection.clone(), key, value, ttl).await,
            Backend::Cluster(connection) => write(&mut connection.clone(), key, value, ttl).await,
            Backend::Sentinel(client) => {
                let mut connection = client.lock().await.get_async_connection().await?;
                write(&mut connection, key, value, ttl).await
            }
        }
    }

    async fn bounded<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T, CacheError> {
        match tokio::time::timeout(OPERATION_TIMEOUT, op).await {
            Ok(result) => result.map_err(CacheError::store),
            Err(_) => Err(CacheError::store(format!(
                "redis operation timed out after {OPERATION_TIMEOUT:?} ({})",
                self.url.target()
            ))),
        }
    }
}

async fn write<C>(connection: &mut C, key: &str, value: String, ttl: Duration) -> RedisResult<()>
where
    C: ConnectionLike + Send + Sync,
{
    if ttl.is_zero() {
        connection.set(key, value).await
    } else {
        connection.set_ex(key, value, ttl.as_secs().max(1)).await
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").field("url", &self.url).finish()
    }
}

impl CacheStore for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { self.bounded(self.fetch(key)).await })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.bounded(self.store(key, value, ttl)).await })
    }
}
