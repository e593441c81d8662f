//! Driver
//!
//! 드라이버 인스턴스, URL, 설정, 주소 해석

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use url::Url;

use crate::bolt::BoltVersion;

use super::bolt::connection::BoltConnection;
use super::error::{DriverError, DriverResult, ErrorClassifier};
use super::pool::{ConnectionProvider, DirectProvider};
use super::retry::RetryConfig;
use super::session::{Session, SessionConfig};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

/// 기본 Fetch Size
pub const DEFAULT_FETCH_SIZE: i64 = 1000;

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
#[derive(Debug, Clone, Default)]
pub enum AuthToken {
    /// 인증 없음
    #[default]
    None,
    /// Basic 인증 (사용자명/비밀번호)
    Basic {
        /// 사용자명
        username: String,
        /// 비밀번호
        password: String,
        /// 렐름
        realm: Option<String>,
    },
    /// Bearer 토큰
    Bearer {
        /// 토큰
        token: String,
    },
    /// Kerberos 인증
    Kerberos {
        /// base64 티켓
        ticket: String,
    },
    /// 커스텀 인증
    Custom {
        /// 주체
        principal: String,
        /// 자격 증명
        credentials: String,
        /// 렐름
        realm: Option<String>,
        /// 스킴
        scheme: String,
        /// 추가 파라미터
        parameters: HashMap<String, String>,
    },
}

impl AuthToken {
    /// Basic 인증 토큰 생성
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    /// Basic 인증 토큰 생성 (realm 포함)
    pub fn basic_with_realm(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: Some(realm.into()),
        }
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Kerberos 토큰 생성
    pub fn kerberos(ticket: impl Into<String>) -> Self {
        Self::Kerberos {
            ticket: ticket.into(),
        }
    }

    /// 인증 없음
    pub fn none() -> Self {
        Self::None
    }

    /// 인증 스킴
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::Kerberos { .. } => "kerberos",
            Self::Custom { scheme, .. } => scheme,
        }
    }
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `bolt://host[:port]` URL 파싱
    ///
    /// `bolt` 이외의 스킴은 네트워크 I/O 전에 설정 오류로 거부한다.
    pub fn from_uri(uri: &str) -> DriverResult<Self> {
        let url = Url::parse(uri)
            .map_err(|e| DriverError::configuration(format!("Invalid URL '{}': {}", uri, e)))?;

        if url.scheme() != "bolt" {
            return Err(DriverError::configuration(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DriverError::configuration(format!("Missing host in URL '{}'", uri)))?;

        Ok(Self::new(host, url.port().unwrap_or(DEFAULT_PORT)))
    }

    /// 소켓 주소로 변환
    pub fn to_socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// AddressResolver - 주소 해석
// ============================================================================

/// 연결 시도마다 호출되는 주소 해석기
///
/// 반환된 후보는 순서대로 시도되고, 모두 실패하면 마지막 오류가 보고된다.
pub trait AddressResolver: Send + Sync {
    /// 후보 주소들
    fn resolve(&self, address: &ServerAddress) -> Box<dyn Iterator<Item = ServerAddress> + Send>;
}

/// 설정된 주소를 그대로 반환
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl AddressResolver for IdentityResolver {
    fn resolve(&self, address: &ServerAddress) -> Box<dyn Iterator<Item = ServerAddress> + Send> {
        Box::new(std::iter::once(address.clone()))
    }
}

impl<F> AddressResolver for F
where
    F: Fn(&ServerAddress) -> Vec<ServerAddress> + Send + Sync,
{
    fn resolve(&self, address: &ServerAddress) -> Box<dyn Iterator<Item = ServerAddress> + Send> {
        Box::new(self(address).into_iter())
    }
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
///
/// | 필드 | 기본값 |
/// |------|--------|
/// | `connection_timeout` | 30초 |
/// | `read_timeout` | 없음 |
/// | `fetch_size` | 1000 |
/// | `retry` | [`RetryConfig::default`] |
/// | `resolver` | [`IdentityResolver`] |
#[derive(Clone)]
pub struct DriverConfig {
    /// 서버 주소
    pub address: ServerAddress,
    /// 인증 토큰
    pub auth: AuthToken,
    /// User Agent
    pub user_agent: String,
    /// 연결 타임아웃
    pub connection_timeout: Duration,
    /// 응답 대기 타임아웃 (만료 시 연결 폐기)
    pub read_timeout: Option<Duration>,
    /// PULL 당 레코드 수 (-1 = 전부)
    pub fetch_size: i64,
    /// 트랜잭션 재시도 정책
    pub retry: RetryConfig,
    /// 주소 해석기
    pub resolver: Arc<dyn AddressResolver>,
    /// 서버 오류 코드 분류기
    pub classifier: Arc<ErrorClassifier>,
}

impl DriverConfig {
    /// 새 설정 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        Ok(Self {
            address: ServerAddress::from_uri(uri)?,
            auth,
            user_agent: super::bolt::CLIENT_USER_AGENT.to_string(),
            connection_timeout: Duration::from_secs(30),
            read_timeout: None,
            fetch_size: DEFAULT_FETCH_SIZE,
            retry: RetryConfig::default(),
            resolver: Arc::new(IdentityResolver),
            classifier: Arc::new(ErrorClassifier::default()),
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("address", &self.address)
            .field("scheme", &self.auth.scheme())
            .field("user_agent", &self.user_agent)
            .field("connection_timeout", &self.connection_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("fetch_size", &self.fetch_size)
            .field("retry", &self.retry)
            .finish()
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
#[derive(Debug)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 응답 대기 타임아웃 설정
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = size;
        self
    }

    /// 재시도 정책 설정
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// 최대 트랜잭션 재시도 시간 설정
    pub fn with_max_transaction_retry_time(mut self, time: Duration) -> Self {
        self.config.retry.max_retry_time = time;
        self
    }

    /// 주소 해석기 설정
    pub fn with_resolver(mut self, resolver: impl AddressResolver + 'static) -> Self {
        self.config.resolver = Arc::new(resolver);
        self
    }

    /// 오류 분류기 설정
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.config.classifier = Arc::new(classifier);
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// ServerInfo - 서버 정보
// ============================================================================

/// 서버 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// 서버 주소
    pub address: String,
    /// 협상된 프로토콜 버전
    pub protocol_version: BoltVersion,
    /// 서버 에이전트
    pub agent: Option<String>,
    /// 서버가 부여한 연결 ID
    pub connection_id: Option<String>,
}

impl ServerInfo {
    pub(crate) fn from_connection(conn: &BoltConnection) -> Self {
        Self {
            address: conn.address().to_string(),
            protocol_version: conn.version(),
            agent: conn.server_agent().map(str::to_string),
            connection_id: conn.connection_id().map(str::to_string),
        }
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Server @ {} (Agent: {}, Protocol: {})",
            self.address,
            self.agent.as_deref().unwrap_or("unknown"),
            self.protocol_version
        )
    }
}

// ============================================================================
// Driver - 드라이버
// ============================================================================

/// 그래프 데이터베이스 드라이버
pub struct Driver {
    /// 설정
    config: Arc<DriverConfig>,
    /// 연결 제공자
    provider: Arc<dyn ConnectionProvider>,
    /// 열린 상태
    open: RwLock<bool>,
}

impl Driver {
    /// 새 드라이버 생성 (네트워크 I/O 없음)
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        Self::with_config(DriverConfig::new(uri, auth)?)
    }

    /// 설정으로 드라이버 생성
    pub fn with_config(config: DriverConfig) -> DriverResult<Self> {
        let provider = Arc::new(DirectProvider::new(&config));
        Ok(Self::with_provider(config, provider))
    }

    /// 외부 연결 제공자로 드라이버 생성
    pub fn with_provider(config: DriverConfig, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            open: RwLock::new(true),
        }
    }

    /// 세션 생성
    pub async fn session(&self, config: SessionConfig) -> DriverResult<Session> {
        self.ensure_open()?;
        let conn = self.provider.acquire().await?;
        Ok(Session::new(conn, self.provider.clone(), config, &self.config))
    }

    /// 연결 확인
    pub async fn verify_connectivity(&self) -> DriverResult<()> {
        self.with_connection(|_| ()).await
    }

    /// 서버 정보 조회
    pub async fn server_info(&self) -> DriverResult<ServerInfo> {
        self.with_connection(ServerInfo::from_connection).await
    }

    /// 데이터베이스 선택 지원 여부
    pub async fn supports_multi_db(&self) -> DriverResult<bool> {
        self.with_connection(|conn| conn.adapter().capabilities().database_selection)
            .await
    }

    async fn with_connection<T>(&self, f: impl FnOnce(&BoltConnection) -> T) -> DriverResult<T> {
        self.ensure_open()?;
        let conn = self.provider.acquire().await?;
        let value = f(&conn);
        self.provider.release(conn).await;
        Ok(value)
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 드라이버 종료
    pub async fn close(&self) -> DriverResult<()> {
        {
            let mut open = self.open.write();
            if !*open {
                return Ok(());
            }
            *open = false;
        }
        self.provider.close().await;
        Ok(())
    }

    /// 열린 상태 확인
    fn ensure_open(&self) -> DriverResult<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(DriverError::session("Driver is closed"))
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("address", &self.config.address)
            .field("open", &*self.open.read())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::bolt::stub::ScriptedProvider;
    use crate::driver::error::ErrorKind;

    fn config() -> DriverConfig {
        DriverConfig::new("bolt://localhost:7687", AuthToken::none()).unwrap()
    }

    #[test]
    fn test_auth_token_basic() {
        let auth = AuthToken::basic("neo4j", "password");
        assert_eq!(auth.scheme(), "basic");

        if let AuthToken::Basic { username, password, realm } = auth {
            assert_eq!(username, "neo4j");
            assert_eq!(password, "password");
            assert!(realm.is_none());
        } else {
            panic!("Expected Basic auth");
        }
    }

    #[test]
    fn test_auth_token_schemes() {
        assert_eq!(AuthToken::bearer("t").scheme(), "bearer");
        assert_eq!(AuthToken::kerberos("t").scheme(), "kerberos");
        assert_eq!(AuthToken::none().scheme(), "none");
        assert!(matches!(AuthToken::default(), AuthToken::None));
    }

    #[test]
    fn test_server_address_from_uri() {
        let addr = ServerAddress::from_uri("bolt://localhost:7688").unwrap();
        assert_eq!(addr, ServerAddress::new("localhost", 7688));

        let addr = ServerAddress::from_uri("bolt://db.example.com").unwrap();
        assert_eq!(addr.port, DEFAULT_PORT);
        assert_eq!(addr.to_string(), "db.example.com:7687");
    }

    #[test]
    fn test_unsupported_scheme() {
        for uri in ["neo4j://localhost:7687", "bolt+s://localhost", "http://localhost"] {
            let err = Driver::new(uri, AuthToken::none()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{}", uri);
        }
        let err = ServerAddress::from_uri("neo4j://localhost").unwrap_err();
        assert!(err.to_string().contains("Unsupported URL scheme: neo4j"));
    }

    #[test]
    fn test_invalid_uri() {
        assert_eq!(
            ServerAddress::from_uri("not a url").unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_driver_config_builder() {
        let config = DriverConfig::builder("bolt://localhost:7687", AuthToken::none())
            .unwrap()
            .with_connection_timeout(Duration::from_secs(10))
            .with_read_timeout(Duration::from_secs(5))
            .with_fetch_size(500)
            .with_max_transaction_retry_time(Duration::from_secs(3))
            .with_user_agent("app/1.0")
            .build();

        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.fetch_size, 500);
        assert_eq!(config.retry.max_retry_time, Duration::from_secs(3));
        assert_eq!(config.user_agent, "app/1.0");
    }

    #[test]
    fn test_driver_config_defaults() {
        let config = config();
        assert_eq!(config.fetch_size, 1000);
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.retry.max_retry_time, Duration::from_secs(30));
    }

    #[test]
    fn test_identity_and_closure_resolvers() {
        let address = ServerAddress::new("db", 7687);
        let same: Vec<_> = IdentityResolver.resolve(&address).collect();
        assert_eq!(same, vec![address.clone()]);

        let resolver = |a: &ServerAddress| {
            vec![ServerAddress::new("a", a.port), ServerAddress::new("b", a.port)]
        };
        let candidates: Vec<_> = resolver.resolve(&address).map(|a| a.host).collect();
        assert_eq!(candidates, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_server_info_and_multi_db() {
        let (provider, _server) = ScriptedProvider::single(BoltVersion::V4_4, vec![]).await;
        let driver = Driver::with_provider(config(), provider.clone());

        let info = driver.server_info().await.unwrap();
        assert_eq!(info.address, "stub:7687");
        assert_eq!(info.protocol_version, BoltVersion::V4_4);
        assert_eq!(*provider.released.lock(), 1);
    }

    #[tokio::test]
    async fn test_supports_multi_db_by_version() {
        let (v3, _s3) = ScriptedProvider::single(BoltVersion::V3_0, vec![]).await;
        let driver = Driver::with_provider(config(), v3);
        assert!(!driver.supports_multi_db().await.unwrap());

        let (v4, _s4) = ScriptedProvider::single(BoltVersion::V4_0, vec![]).await;
        let driver = Driver::with_provider(config(), v4);
        assert!(driver.supports_multi_db().await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_driver() {
        let (provider, _server) = ScriptedProvider::single(BoltVersion::V4_4, vec![]).await;
        let driver = Driver::with_provider(config(), provider);
        driver.close().await.unwrap();
        driver.close().await.unwrap();

        let err = driver.session(SessionConfig::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
