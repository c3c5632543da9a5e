//! Health reporting.
//!
//! A service owns an ordered list of probes. The built-in health route runs
//! all of them on every request and reports the most severe status among
//! them; the HTTP status of that route is always `200 OK`, degradation is
//! visible only in the `status` field of the JSON body.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hyper::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::DirectoryConfig;
use crate::http::Response;

/// Name of the report produced by the directory probe.
pub const DIRECTORIES_CHECK: &str = "Directory access permissions";

/// Severity of a health report, ordered `Ok < Warning < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Ok,
    Warning,
    Critical,
}

/// The outcome of one check, optionally with the reports it aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check_reports: Vec<HealthReport>,
}

impl HealthReport {
    pub fn new(name: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        HealthReport {
            status,
            name: name.into(),
            message: message.into(),
            check_reports: Vec::new(),
        }
    }

    pub fn ok(name: impl Into<String>) -> Self {
        HealthReport::new(name, HealthStatus::Ok, "")
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }
}

/// A zero-argument health probe.
pub type Probe = Arc<dyn Fn() -> HealthReport + Send + Sync>;

/// The most severe status in `reports`, or `Ok` when there are none.
pub fn aggregate(reports: &[HealthReport]) -> HealthStatus {
    reports
        .iter()
        .map(HealthReport::status)
        .max()
        .unwrap_or_default()
}

/// The probes of one service together with its name.
#[derive(Clone)]
pub struct HealthCheck {
    name: String,
    probes: Vec<Probe>,
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, probes: Vec<Probe>) -> Self {
        HealthCheck {
            name: name.into(),
            probes,
        }
    }

    /// Runs every probe once, in order, and aggregates the results.
    ///
    /// A probe that panics is reported as `Critical` instead of failing the
    /// whole check.
    pub fn run(&self) -> HealthReport {
        let check_reports: Vec<HealthReport> = self
            .probes
            .iter()
            .enumerate()
            .map(|(index, probe)| {
                panic::catch_unwind(AssertUnwindSafe(|| probe())).unwrap_or_else(|_| {
                    log::error!("Health probe #{} panicked", index);
                    HealthReport::new(
                        format!("probe #{}", index),
                        HealthStatus::Critical,
                        "probe panicked",
                    )
                })
            })
            .collect();

        HealthReport {
            status: aggregate(&check_reports),
            name: self.name.clone(),
            message: String::new(),
            check_reports,
        }
    }

    pub(crate) fn respond(&self, response: &mut Response) {
        let report = self.run();
        if let Err(e) = response.data_mut().set_json(&report) {
            log::error!("Failed to encode health report: {}", e);
            response.set_error(StatusCode::INTERNAL_SERVER_ERROR, "health report unavailable");
        }
    }
}

/// Builds the default probe checking access to the configured directories.
pub fn directories_probe(dirs: BTreeMap<String, DirectoryConfig>) -> Probe {
    Arc::new(move || check_directories(&dirs))
}

/// Checks every configured directory against its required access.
///
/// Problems are reported as `Warning`, one message line per directory; this
/// check never reports `Critical`.
pub fn check_directories(dirs: &BTreeMap<String, DirectoryConfig>) -> HealthReport {
    let mut messages = Vec::new();

    for (id, dir) in dirs {
        let path = dir.path.as_deref().filter(|p| !p.is_empty());
        let access = dir.access.as_deref().filter(|a| !a.is_empty());

        let message = match (path, access) {
            (Some(path), Some(access)) => check_directory(id, path, access),
            _ => Some(format!(
                "invalid configuration of directory ({}): path and/or access not specified",
                id
            )),
        };

        if let Some(message) = message {
            log::warn!("{}", message);
            messages.push(message);
        }
    }

    let status = if messages.is_empty() {
        HealthStatus::Ok
    } else {
        HealthStatus::Warning
    };
    HealthReport::new(DIRECTORIES_CHECK, status, messages.join("\n"))
}

fn check_directory(id: &str, path: &str, access: &str) -> Option<String> {
    let malformed = || {
        format!(
            "permission spec ({}) for directory ({}) is malformed",
            access, id
        )
    };

    let mode = match access_mode(access) {
        Some(mode) => mode,
        None => return Some(malformed()),
    };

    let err = match check_access(path, mode) {
        Ok(()) => return None,
        Err(err) => err,
    };

    let message = match err.raw_os_error() {
        Some(libc::EACCES) => format!(
            "insufficient permissions ({}) for directory ({})",
            access, id
        ),
        Some(libc::ENOENT) | Some(libc::ENOTDIR) => format!(
            "path ({}) to directory ({}) does not exist",
            path, id
        ),
        Some(libc::EINVAL) => malformed(),
        _ => format!("unknown error for directory ({}): \"{}\"", id, err),
    };
    Some(message)
}

/// Translates `r`, `w`, `x` letters into an `access(2)` mode. Each letter may
/// appear once, in any order.
fn access_mode(spec: &str) -> Option<libc::c_int> {
    let mut mode = 0;
    for letter in spec.chars() {
        let bit = match letter {
            'r' => libc::R_OK,
            'w' => libc::W_OK,
            'x' => libc::X_OK,
            _ => return None,
        };
        if mode & bit != 0 {
            return None;
        }
        mode |= bit;
    }
    if mode == 0 {
        None
    } else {
        Some(mode)
    }
}

fn check_access(path: &str, mode: libc::c_int) -> io::Result<()> {
    let c_path = CString::new(path)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::access(c_path.as_ptr(), mode) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn report(status: HealthStatus) -> HealthReport {
        HealthReport::new("probe", status, "")
    }

    fn probe(status: HealthStatus) -> Probe {
        Arc::new(move || report(status))
    }

    /// Tests that the overall status is the maximum severity.
    #[test]
    fn test_aggregation_monotonicity() {
        use HealthStatus::*;

        assert_eq!(aggregate(&[report(Ok), report(Ok)]), Ok);
        assert_eq!(aggregate(&[report(Ok), report(Warning)]), Warning);
        assert_eq!(aggregate(&[report(Warning), report(Critical)]), Critical);
        assert_eq!(aggregate(&[report(Critical), report(Ok)]), Critical);
        assert_eq!(aggregate(&[]), Ok);
    }

    #[test]
    fn test_run_collects_reports() {
        let check = HealthCheck::new(
            "inventory",
            vec![probe(HealthStatus::Ok), probe(HealthStatus::Warning)],
        );

        let report = check.run();
        assert_eq!(report.name, "inventory");
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.check_reports.len(), 2);
    }

    /// Tests the JSON shape: lowercase status, no empty message, no empty list.
    #[test]
    fn test_report_json() {
        let empty = HealthCheck::new("svc", Vec::new()).run();
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            serde_json::json!({"status": "ok", "name": "svc"})
        );

        let db: Probe = Arc::new(|| {
            HealthReport::new("db", HealthStatus::Critical, "connection refused")
        });
        let check = HealthCheck::new("svc", vec![db]);
        assert_eq!(
            serde_json::to_value(check.run()).unwrap(),
            serde_json::json!({
                "status": "critical",
                "name": "svc",
                "check_reports": [
                    {"status": "critical", "name": "db", "message": "connection refused"}
                ]
            })
        );
    }

    #[test]
    fn test_panicking_probe_is_critical() {
        let failing: Probe = Arc::new(|| -> HealthReport { panic!("probe failure") });
        let check = HealthCheck::new("svc", vec![probe(HealthStatus::Ok), failing]);

        let report = check.run();
        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(report.check_reports[1].name, "probe #1");
    }

    #[test]
    fn test_respond_is_always_ok() {
        let check = HealthCheck::new("svc", vec![probe(HealthStatus::Critical)]);
        let mut response = Response::new();
        check.respond(&mut response);

        assert_eq!(response.code(), StatusCode::OK);
        let body: HealthReport = response.data().json().unwrap();
        assert_eq!(body.status, HealthStatus::Critical);
    }

    #[test]
    fn test_access_mode() {
        assert_eq!(access_mode("r"), Some(libc::R_OK));
        assert_eq!(access_mode("xr"), Some(libc::R_OK | libc::X_OK));
        assert_eq!(
            access_mode("rwx"),
            Some(libc::R_OK | libc::W_OK | libc::X_OK)
        );
        assert_eq!(access_mode("rr"), None);
        assert_eq!(access_mode("rq"), None);
        assert_eq!(access_mode(""), None);
    }

    #[test]
    fn test_accessible_directory_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut dirs = BTreeMap::new();
        dirs.insert(
            "data".to_string(),
            DirectoryConfig::new(dir.path().to_str().unwrap(), "rwx"),
        );

        let report = check_directories(&dirs);
        assert_eq!(report.name, DIRECTORIES_CHECK);
        assert_eq!(report.status, HealthStatus::Ok);
        assert!(report.message.is_empty());
    }

    /// Tests that a directory lacking the requested bit is a warning naming
    /// the directory id. Execute permission is used because it is enforced
    /// even for root.
    #[test]
    fn test_missing_permission_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        fs::create_dir(&uploads).unwrap();
        fs::set_permissions(&uploads, fs::Permissions::from_mode(0o600)).unwrap();

        let mut dirs = BTreeMap::new();
        dirs.insert(
            "uploads".to_string(),
            DirectoryConfig::new(uploads.to_str().unwrap(), "x"),
        );

        let report = check_directories(&dirs);
        fs::set_permissions(&uploads, fs::Permissions::from_mode(0o700)).unwrap();

        assert_eq!(report.status, HealthStatus::Warning);
        assert!(report.message.contains("(uploads)"), "{}", report.message);
        assert!(report.message.contains("insufficient permissions (x)"));
    }

    #[test]
    fn test_missing_path_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");

        let mut dirs = BTreeMap::new();
        dirs.insert(
            "cache".to_string(),
            DirectoryConfig::new(missing.to_str().unwrap(), "r"),
        );

        let report = check_directories(&dirs);
        assert_eq!(report.status, HealthStatus::Warning);
        assert!(report.message.contains("does not exist"));
        assert!(report.message.contains("(cache)"));
    }

    #[test]
    fn test_configuration_problems_are_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();

        let mut dirs = BTreeMap::new();
        dirs.insert(
            "incomplete".to_string(),
            DirectoryConfig {
                path: Some(path.clone()),
                access: None,
            },
        );
        dirs.insert("typo".to_string(), DirectoryConfig::new(path, "rz"));

        let report = check_directories(&dirs);
        assert_eq!(report.status, HealthStatus::Warning);

        let lines: Vec<&str> = report.message.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("invalid configuration of directory (incomplete)"));
        assert!(lines[1].contains("permission spec (rz) for directory (typo) is malformed"));
    }

    #[test]
    fn test_directories_probe() {
        let probe = directories_probe(BTreeMap::new());
        assert_eq!(probe().status, HealthStatus::Ok);
    }
}
