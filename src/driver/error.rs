//! Driver Error Types
//!
//! 드라이버 에러 정의 및 서버 에러 코드 분류

use thiserror::Error;

use crate::bolt::{BoltError, FailureMessage};

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 연결 에러 (연결은 폐기됨)
    #[error("Connectivity error: {message}")]
    Connectivity {
        /// 에러 메시지
        message: String,
        /// 원인이 된 와이어 에러
        #[source]
        source: Option<BoltError>,
    },

    /// 인증 에러
    #[error("Authentication error: {code} - {message}")]
    Authentication {
        /// 서버 에러 코드
        code: String,
        /// 서버 에러 메시지
        message: String,
    },

    /// 클라이언트 에러 (쿼리 오류 등)
    #[error("Client error: {code} - {message}")]
    Client {
        /// 서버 에러 코드
        code: String,
        /// 서버 에러 메시지
        message: String,
    },

    /// 일시적 에러 (재시도 가능)
    #[error("Transient error: {code} - {message}")]
    Transient {
        /// 서버 에러 코드
        code: String,
        /// 서버 에러 메시지
        message: String,
    },

    /// 데이터베이스 에러
    #[error("Database error: {code} - {message}")]
    Database {
        /// 서버 에러 코드
        code: String,
        /// 서버 에러 메시지
        message: String,
    },

    /// 프로토콜 에러
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 타입 변환 에러
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// 세션 사용 에러
    #[error("Session error: {0}")]
    Session(String),

    /// 트랜잭션 상태 에러
    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// 에러 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 연결 실패
    Connectivity,
    /// 인증 실패
    Authentication,
    /// 클라이언트 에러
    Client,
    /// 일시적 에러
    Transient,
    /// 데이터베이스 에러
    Database,
    /// 프로토콜 위반
    Protocol,
    /// 설정 오류
    Configuration,
    /// 타입 변환 실패
    TypeConversion,
    /// 잘못된 API 사용
    Usage,
}

impl DriverError {
    /// 연결 에러 생성
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity {
            message: msg.into(),
            source: None,
        }
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 세션 에러 생성
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// 트랜잭션 에러 생성
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 타입 변환 에러 생성
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// 에러 종류
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Client { .. } => ErrorKind::Client,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Database { .. } => ErrorKind::Database,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::TypeConversion(_) => ErrorKind::TypeConversion,
            Self::Session(_) | Self::Transaction(_) => ErrorKind::Usage,
        }
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// 연결을 더 이상 쓸 수 없는 에러인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connectivity | ErrorKind::Authentication | ErrorKind::Protocol
        )
    }

    /// 서버 에러 코드 (서버에서 온 에러만)
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Authentication { code, .. }
            | Self::Client { code, .. }
            | Self::Transient { code, .. }
            | Self::Database { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        if err.is_connectivity() {
            DriverError::Connectivity {
                message: err.to_string(),
                source: Some(err),
            }
        } else {
            DriverError::Protocol(err.to_string())
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// ErrorClassifier - 서버 에러 코드 분류
// ============================================================================

/// 서버 에러 코드 분류기
///
/// 규칙은 순서대로 검사되며 처음 일치하는 규칙이 적용됩니다.
/// 패턴은 정확한 코드이거나 `*`로 끝나는 접두사입니다.
/// 어떤 규칙에도 맞지 않는 코드는 데이터베이스 에러입니다.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<(String, ErrorKind)>,
}

impl ErrorClassifier {
    /// 규칙 없는 분류기 (모든 코드가 데이터베이스 에러)
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// 규칙 추가 (기존 규칙 뒤에)
    pub fn with_rule(mut self, pattern: impl Into<String>, kind: ErrorKind) -> Self {
        self.rules.push((pattern.into(), kind));
        self
    }

    /// 규칙 추가 (기존 규칙 앞에, 우선 적용)
    pub fn with_override(mut self, pattern: impl Into<String>, kind: ErrorKind) -> Self {
        self.rules.insert(0, (pattern.into(), kind));
        self
    }

    /// 코드의 에러 종류
    pub fn kind_of(&self, code: &str) -> ErrorKind {
        self.rules
            .iter()
            .find(|(pattern, _)| match pattern.strip_suffix('*') {
                Some(prefix) => code.starts_with(prefix),
                None => code == pattern,
            })
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::Database)
    }

    /// FAILURE 메시지를 드라이버 에러로 변환
    pub fn classify(&self, failure: FailureMessage) -> DriverError {
        let FailureMessage { code, message } = failure;
        match self.kind_of(&code) {
            ErrorKind::Authentication => DriverError::Authentication { code, message },
            ErrorKind::Client => DriverError::Client { code, message },
            ErrorKind::Transient => DriverError::Transient { code, message },
            ErrorKind::Connectivity => DriverError::Connectivity {
                message: format!("{}: {}", code, message),
                source: None,
            },
            ErrorKind::Protocol => DriverError::Protocol(format!("{}: {}", code, message)),
            _ => DriverError::Database { code, message },
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::empty()
            .with_rule("Neo.ClientError.Security.Unauthorized", ErrorKind::Authentication)
            .with_rule("Neo.ClientError.Security.AuthenticationRateLimit", ErrorKind::Authentication)
            .with_rule("Neo.ClientError.Security.CredentialsExpired", ErrorKind::Authentication)
            .with_rule("Neo.TransientError.Transaction.Terminated", ErrorKind::Client)
            .with_rule("Neo.TransientError.Transaction.LockClientStopped", ErrorKind::Client)
            .with_rule("Neo.TransientError.*", ErrorKind::Transient)
            .with_rule("Neo.ClientError.*", ErrorKind::Client)
            .with_rule("Neo.DatabaseError.*", ErrorKind::Database)
    }
}

// ============================================================================
// Tests
// ============================================================================
