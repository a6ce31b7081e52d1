//! Persistent port ledger.
//!
//! The ledger file is the sole source of truth for which host ports belong to
//! which `(project, service, container-port)` triple. Nothing recomputes
//! allocations from scratch; provisioning reads what is stored here and
//! re-running it never reshuffles live ports.
//!
//! Every operation is a load-mutate-save of the JSON file under one
//! reader/writer lock. That serializes callers within a process; two separate
//! processes can still race on the file, which is an accepted limitation.

use crate::error::{Error, Result};
use crate::fsio::atomic_write;
use crate::identity::{ServiceSpec, WELL_KNOWN_WEB_PORT};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

/// Host ports are drawn from this range, above the well-known ports.
pub const DYNAMIC_RANGE_START: u16 = 10000;
pub const DYNAMIC_RANGE_END: u16 = 10999;

/// Conventional alternates tried when a service asks for the well-known web
/// port, which is never directly bindable without privileges.
pub const WEB_PORT_ALTERNATES: [u16; 3] = [8000, 8080, 8888];

/// `service -> container port -> host port` for one project.
pub type ServicePortMap = BTreeMap<String, BTreeMap<u16, u16>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPorts {
    /// Flat `"service:containerPort" -> hostPort` rows, as persisted.
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub reserved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    allocations: BTreeMap<String, ProjectPorts>,
    #[serde(rename = "nextPort", default = "default_cursor")]
    next_port: u16,
}

fn default_cursor() -> u16 {
    DYNAMIC_RANGE_START
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            allocations: BTreeMap::new(),
            next_port: DYNAMIC_RANGE_START,
        }
    }
}

/// Mutex-guarded registry of host-port assignments, persisted as JSON.
pub struct PortLedger {
    path: PathBuf,
    lock: RwLock<()>,
}

impl PortLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allocate host ports for a project's declared services.
    ///
    /// Idempotent: if the stored allocation covers exactly the requested
    /// `(service, containerPort)` set, it is returned unchanged. A changed
    /// topology replaces the project's allocation wholesale. Nothing is
    /// persisted when the range is exhausted mid-allocation.
    pub fn allocate(&self, project: &str, services: &[ServiceSpec]) -> Result<ServicePortMap> {
        let _guard = self.lock.write();
        let mut file = self.load()?;

        let requested = requested_keys(services);
        if let Some(existing) = file.allocations.get(project) {
            let stored: BTreeSet<String> = existing.ports.keys().cloned().collect();
            if stored == requested {
                return Ok(unflatten(&existing.ports));
            }
            // Topology changed: drop the old rows and assign fresh below.
            file.allocations.remove(project);
        }

        let mut taken: HashSet<u16> = file
            .allocations
            .values()
            .flat_map(|p| p.ports.values().copied())
            .collect();
        let mut cursor = file.next_port;
        let mut rows: BTreeMap<String, u16> = BTreeMap::new();

        let mut ordered: Vec<&ServiceSpec> = services.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        for spec in ordered {
            let mut ports = spec.container_ports.clone();
            ports.sort_unstable();
            ports.dedup();
            for container_port in ports {
                let host_port = choose_host_port(project, container_port, &taken, &mut cursor)?;
                taken.insert(host_port);
                rows.insert(format!("{}:{}", spec.name, container_port), host_port);
            }
        }

        let result = unflatten(&rows);
        file.allocations.insert(
            project.to_string(),
            ProjectPorts {
                ports: rows,
                reserved: true,
            },
        );
        file.next_port = cursor;
        self.save(&file)?;
        Ok(result)
    }

    /// Stored allocation for a project, if any.
    pub fn allocation(&self, project: &str) -> Result<Option<ServicePortMap>> {
        let _guard = self.lock.read();
        let file = self.load()?;
        Ok(file.allocations.get(project).map(|p| unflatten(&p.ports)))
    }

    /// Names of all projects with a stored allocation.
    pub fn projects(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        let file = self.load()?;
        Ok(file.allocations.keys().cloned().collect())
    }

    /// Delete a project's allocation outright. Freed ports become eligible
    /// again through the live bind probe on the next allocation; the host OS
    /// is not consulted here.
    pub fn release(&self, project: &str) -> Result<bool> {
        let _guard = self.lock.write();
        let mut file = self.load()?;
        let removed = file.allocations.remove(project).is_some();
        if removed {
            self.save(&file)?;
        }
        Ok(removed)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    fn load(&self) -> Result<LedgerFile> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerFile::default());
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "Failed to read port ledger {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&contents).map_err(|e| {
            Error::Config(format!(
                "Port ledger {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, file: &LedgerFile) -> Result<()> {
        let contents = serde_json::to_string_pretty(file)?;
        atomic_write(&self.path, &contents)
    }
}

fn requested_keys(services: &[ServiceSpec]) -> BTreeSet<String> {
    services
        .iter()
        .flat_map(|s| {
            s.container_ports
                .iter()
                .map(move |p| format!("{}:{}", s.name, p))
        })
        .collect()
}

fn unflatten(rows: &BTreeMap<String, u16>) -> ServicePortMap {
    let mut map = ServicePortMap::new();
    for (key, host_port) in rows {
        let Some((service, container_port)) = key.rsplit_once(':') else {
            continue;
        };
        let Ok(container_port) = container_port.parse::<u16>() else {
            continue;
        };
        map.entry(service.to_string())
            .or_default()
            .insert(container_port, *host_port);
    }
    map
}

/// Pick a host port for one requested container port.
///
/// Order: the container port itself when it already lies in the dynamic
/// range, then the conventional web alternates for the well-known web port,
/// then a forward scan from the ledger-wide cursor. The cursor advances past
/// every port the scan touches, wrapping once, so repeated allocations do not
/// keep re-probing the same low ports.
fn choose_host_port(
    project: &str,
    container_port: u16,
    taken: &HashSet<u16>,
    cursor: &mut u16,
) -> Result<u16> {
    let free = |port: u16| !taken.contains(&port) && probe_bindable(port);

    if in_dynamic_range(container_port) && free(container_port) {
        return Ok(container_port);
    }

    if container_port == WELL_KNOWN_WEB_PORT {
        for alt in WEB_PORT_ALTERNATES {
            if free(alt) {
                return Ok(alt);
            }
        }
    }

    let range_len = (DYNAMIC_RANGE_END - DYNAMIC_RANGE_START) as u32 + 1;
    for _ in 0..range_len {
        let candidate = *cursor;
        *cursor = if candidate >= DYNAMIC_RANGE_END {
            DYNAMIC_RANGE_START
        } else {
            candidate + 1
        };
        if free(candidate) {
            return Ok(candidate);
        }
    }

    Err(Error::AllocationExhausted {
        project: project.to_string(),
        start: DYNAMIC_RANGE_START,
        end: DYNAMIC_RANGE_END,
    })
}

fn in_dynamic_range(port: u16) -> bool {
    (DYNAMIC_RANGE_START..=DYNAMIC_RANGE_END).contains(&port)
}

/// Real bind/release probe.
///
/// The ledger only knows about its own claims; a port held by some unrelated
/// process is detected here. Binding 0.0.0.0 as well catches dual-stack
/// conflicts; on Linux that second bind may fail because the loopback bind
/// already covers it, which is fine.
fn probe_bindable(port: u16) -> bool {
    let Ok(v4) = TcpListener::bind(("127.0.0.1", port)) else {
        return false;
    };
    let any = TcpListener::bind(("0.0.0.0", port));
    drop(v4);
    drop(any);
    true
}
