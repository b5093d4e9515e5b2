//! 설정 관리: keel.toml 파싱 및 런타임 설정
//!
//! [`KeelConfig`]는 검증 실행에 필요한 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`KEEL_UPGRADE_MODE=online` 형식)
//! 3. 설정 파일 (`keel.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), keel_core::error::KeelError> {
//! use keel_core::config::KeelConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = KeelConfig::load("keel.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = KeelConfig::parse("[upgrade]\nmode = \"online\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, KeelError};
use crate::types::{SafetyChecks, UpgradeMode};

/// 원격 명령 최대 타임아웃 (초)
const MAX_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// keel 통합 설정
///
/// `keel.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeelConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 관리 대상 도구 설정
    #[serde(default)]
    pub tool: ToolConfig,
    /// 업그레이드 설정
    #[serde(default)]
    pub upgrade: UpgradeConfig,
    /// 원격 실행 설정
    #[serde(default)]
    pub remote: RemoteConfig,
    /// 도달성 프로브 설정
    #[serde(default)]
    pub probe: ProbeConfig,
    /// 시나리오 실행 설정
    #[serde(default)]
    pub scenario: ScenarioConfig,
    /// 노드 프로비저너 설정
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
}

impl KeelConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, KeelError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, KeelError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KeelError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                KeelError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, KeelError> {
        toml::from_str(toml_str).map_err(|e| {
            KeelError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `KEEL_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "KEEL_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "KEEL_GENERAL_LOG_FORMAT");
        override_path(&mut self.general.work_dir, "KEEL_GENERAL_WORK_DIR");

        // Tool
        override_string(&mut self.tool.binary, "KEEL_TOOL_BINARY");
        override_string(&mut self.tool.plan_file, "KEEL_TOOL_PLAN_FILE");
        override_string(
            &mut self.tool.expected_version,
            "KEEL_TOOL_EXPECTED_VERSION",
        );
        override_path(&mut self.tool.archive_dir, "KEEL_TOOL_ARCHIVE_DIR");
        override_string(
            &mut self.tool.current_archive,
            "KEEL_TOOL_CURRENT_ARCHIVE",
        );
        override_csv(
            &mut self.tool.source_versions,
            "KEEL_TOOL_SOURCE_VERSIONS",
        );

        // Upgrade
        override_string(&mut self.upgrade.mode, "KEEL_UPGRADE_MODE");
        override_opt_bool(
            &mut self.upgrade.ignore_safety_checks,
            "KEEL_UPGRADE_IGNORE_SAFETY_CHECKS",
        );
        override_u64(&mut self.upgrade.timeout_secs, "KEEL_UPGRADE_TIMEOUT_SECS");

        // Remote
        override_path(&mut self.remote.ssh_key, "KEEL_REMOTE_SSH_KEY");
        override_u16(&mut self.remote.ssh_port, "KEEL_REMOTE_SSH_PORT");
        override_u64(
            &mut self.remote.command_timeout_secs,
            "KEEL_REMOTE_COMMAND_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.remote.connect_timeout_secs,
            "KEEL_REMOTE_CONNECT_TIMEOUT_SECS",
        );

        // Probe
        override_u64(&mut self.probe.timeout_secs, "KEEL_PROBE_TIMEOUT_SECS");
        override_string(&mut self.probe.external_url, "KEEL_PROBE_EXTERNAL_URL");
        override_string(
            &mut self.probe.dashboard_user,
            "KEEL_PROBE_DASHBOARD_USER",
        );
        override_string(
            &mut self.probe.dashboard_password,
            "KEEL_PROBE_DASHBOARD_PASSWORD",
        );

        // Scenario
        override_u64(
            &mut self.scenario.step_timeout_secs,
            "KEEL_SCENARIO_STEP_TIMEOUT_SECS",
        );

        // Provisioner
        override_csv(
            &mut self.provisioner.terminate_command,
            "KEEL_PROVISIONER_TERMINATE_COMMAND",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), KeelError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.tool.binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "tool.binary".to_owned(),
                reason: "binary path must not be empty".to_owned(),
            }
            .into());
        }

        if self.tool.plan_file.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "tool.plan_file".to_owned(),
                reason: "plan file must not be empty".to_owned(),
            }
            .into());
        }

        // expected_version은 비어 있으면 실행 시점에 요구됨
        if !self.tool.expected_version.is_empty() {
            self.tool.expected_version()?;
        }

        // 모드 + 안전 점검 정책 조합 검증
        let mode = self.upgrade.mode()?;
        if mode == UpgradeMode::Offline && self.upgrade.ignore_safety_checks == Some(true) {
            return Err(ConfigError::InvalidValue {
                field: "upgrade.ignore_safety_checks".to_owned(),
                reason: "safety checks can only be bypassed in online mode".to_owned(),
            }
            .into());
        }

        let timeouts = [
            ("upgrade.timeout_secs", self.upgrade.timeout_secs),
            ("remote.command_timeout_secs", self.remote.command_timeout_secs),
            ("remote.connect_timeout_secs", self.remote.connect_timeout_secs),
            ("probe.timeout_secs", self.probe.timeout_secs),
            ("scenario.step_timeout_secs", self.scenario.step_timeout_secs),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason: "timeout must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        if self.remote.command_timeout_secs > MAX_COMMAND_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "remote.command_timeout_secs".to_owned(),
                reason: format!("must be at most {MAX_COMMAND_TIMEOUT_SECS}"),
            }
            .into());
        }

        if self.remote.ssh_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "remote.ssh_port".to_owned(),
                reason: "port must be greater than 0".to_owned(),
            }
            .into());
        }

        if !self.provisioner.terminate_command.is_empty()
            && !self
                .provisioner
                .terminate_command
                .iter()
                .any(|arg| arg.contains(NODE_ID_PLACEHOLDER))
        {
            return Err(ConfigError::InvalidValue {
                field: "provisioner.terminate_command".to_owned(),
                reason: format!("command must reference {NODE_ID_PLACEHOLDER}"),
            }
            .into());
        }

        Ok(())
    }
}

/// 프로비저너 명령 템플릿에서 노드 ID로 치환되는 자리표시자
pub const NODE_ID_PLACEHOLDER: &str = "{node_id}";

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 작업 디렉토리 (도구 바이너리와 plan 파일 위치)
    pub work_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            work_dir: PathBuf::from("."),
        }
    }
}

/// 관리 대상 클러스터 도구 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// 도구 바이너리 경로 (작업 디렉토리 기준)
    pub binary: String,
    /// plan 파일 이름 (작업 디렉토리 기준)
    pub plan_file: String,
    /// 업그레이드 후 기대하는 클러스터 버전 (semver)
    pub expected_version: String,
    /// 릴리스 아카이브 디렉토리
    pub archive_dir: PathBuf,
    /// 현재 버전 릴리스 아카이브 파일 이름
    pub current_archive: String,
    /// 업그레이드 출발 버전 목록
    pub source_versions: Vec<String>,
}

impl ToolConfig {
    /// 기대 버전을 semver로 파싱합니다.
    pub fn expected_version(&self) -> Result<semver::Version, ConfigError> {
        let raw = self.expected_version.trim();
        if raw.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "tool.expected_version".to_owned(),
                reason: "expected version must be set".to_owned(),
            });
        }
        semver::Version::parse(raw.trim_start_matches('v')).map_err(|e| {
            ConfigError::InvalidValue {
                field: "tool.expected_version".to_owned(),
                reason: e.to_string(),
            }
        })
    }

    /// 출발 버전의 릴리스 아카이브 경로
    pub fn source_archive(&self, version: &str) -> PathBuf {
        self.archive_dir
            .join(format!("kismatic-{version}-linux-amd64.tar.gz"))
    }

    /// 현재 버전 릴리스 아카이브 경로
    pub fn current_archive_path(&self) -> PathBuf {
        self.archive_dir.join(&self.current_archive)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: "./kismatic".to_owned(),
            plan_file: "kismatic-testing.yaml".to_owned(),
            expected_version: String::new(),
            archive_dir: PathBuf::from("artifacts"),
            current_archive: "kismatic.tar.gz".to_owned(),
            source_versions: vec!["v1.4.1".to_owned(), "v1.4.0".to_owned()],
        }
    }
}

/// 업그레이드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// 업그레이드 모드 (offline, online)
    pub mode: String,
    /// 안전 점검 우회 여부 (미지정 시 모드 기본값)
    pub ignore_safety_checks: Option<bool>,
    /// 업그레이드 명령 타임아웃 (초)
    pub timeout_secs: u64,
}

impl UpgradeConfig {
    pub fn mode(&self) -> Result<UpgradeMode, ConfigError> {
        self.mode.parse()
    }

    /// 명시 정책이 없으면 모드 기본값을 사용합니다.
    pub fn safety_checks(&self) -> Result<SafetyChecks, ConfigError> {
        let mode = self.mode()?;
        Ok(match self.ignore_safety_checks {
            Some(true) => SafetyChecks::Bypassed,
            Some(false) => SafetyChecks::Enforced,
            None => mode.default_safety_checks(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            mode: "offline".to_owned(),
            ignore_safety_checks: None,
            timeout_secs: 3600,
        }
    }
}

/// 원격 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// SSH 개인 키 경로
    pub ssh_key: PathBuf,
    /// SSH 포트
    pub ssh_port: u16,
    /// 원격 명령 기본 타임아웃 (초)
    pub command_timeout_secs: u64,
    /// SSH 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl RemoteConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_key: PathBuf::from("kismatic-integration-testing.pem"),
            ssh_port: 22,
            command_timeout_secs: 300,
            connect_timeout_secs: 10,
        }
    }
}

/// 도달성 프로브 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 네트워크 차단 확인용 외부 주소
    pub external_url: String,
    /// 대시보드 basic-auth 사용자
    pub dashboard_user: String,
    /// 대시보드 basic-auth 비밀번호
    pub dashboard_password: String,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            external_url: "https://www.google.com".to_owned(),
            dashboard_user: "admin".to_owned(),
            dashboard_password: "abbazabba".to_owned(),
        }
    }
}

/// 시나리오 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// 단계별 타임아웃 (초)
    pub step_timeout_secs: u64,
}

impl ScenarioConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 900,
        }
    }
}

/// 노드 프로비저너 설정
///
/// `terminate_command`는 `{node_id}` 자리표시자를 포함하는 argv 템플릿입니다.
/// 비어 있으면 노드 종료 작업이 실패합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub terminate_command: Vec<String>,
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_path(target: &mut PathBuf, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = PathBuf::from(val);
    }
}

fn override_opt_bool(target: &mut Option<bool>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
