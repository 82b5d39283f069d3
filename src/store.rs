//! Persistence for the CA key, CA certificate and serial counter.
//!
//! [`CaStore`] is the seam between the authority and wherever its state lives. Two
//! implementations are provided: [`MemoryStore`] for tests and embedded use, and
//! [`FileStore`], a directory layout that survives process restarts:
//!
//! ```text
//! <root>/ca.key             CA private key, PKCS#8 PEM (optionally encrypted)
//! <root>/ca.crt             CA certificate, PEM
//! <root>/serial             next serial to allocate, decimal
//! <root>/issued/<n>.pem     every certificate issued, by serial
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use zeroize::Zeroizing;

use crate::cert::Certificate;
use crate::config::KeyConfig;
use crate::error::{IssuanceError, Result};
use crate::key::KeyPair;

const KEY_FILE: &str = "ca.key";
const CERT_FILE: &str = "ca.crt";
const SERIAL_FILE: &str = "serial";
const SERIAL_TEMP_FILE: &str = ".serial.tmp";
const ISSUED_DIR: &str = "issued";

/// Serial handed out by a fresh store.
pub const FIRST_SERIAL: u64 = 1;

/// Storage collaborator of a [`CertificateAuthority`](crate::authority::CertificateAuthority).
///
/// `next_serial` must never return the same value twice, across threads and, for
/// persistent stores, across restarts. A serial that is allocated but never recorded is
/// simply skipped.
pub trait CaStore: Send + Sync {
    fn load_ca_key(&self) -> Result<KeyPair>;

    fn load_ca_certificate(&self) -> Result<Certificate>;

    /// Allocates the next serial.
    fn next_serial(&self) -> Result<u64>;

    fn record_issued_certificate(&self, certificate: &Certificate) -> Result<()>;
}

/// Keeps CA state in memory.
pub struct MemoryStore {
    key: Zeroizing<Vec<u8>>,
    certificate: Certificate,
    next: AtomicU64,
    issued: Mutex<Vec<Certificate>>,
}

impl MemoryStore {
    pub fn new(key: &KeyPair, certificate: Certificate) -> Result<Self> {
        Ok(Self {
            key: key.export_private_der()?,
            certificate,
            next: AtomicU64::new(FIRST_SERIAL),
            issued: Mutex::new(Vec::new()),
        })
    }

    /// Starts allocation at `serial`, which must be positive.
    pub fn with_next_serial(self, serial: u64) -> Result<Self> {
        if serial == 0 {
            return Err(IssuanceError::InvalidArgument(
                "certificate serials start at 1".to_string(),
            ));
        }
        self.next.store(serial, Ordering::SeqCst);
        Ok(self)
    }

    /// Certificates recorded so far, in recording order.
    pub fn issued(&self) -> Result<Vec<Certificate>> {
        self.issued
            .lock()
            .map(|issued| issued.clone())
            .map_err(|_| IssuanceError::Store("issued list lock poisoned".to_string()))
    }
}

impl CaStore for MemoryStore {
    fn load_ca_key(&self) -> Result<KeyPair> {
        KeyPair::import(&self.key, None)
    }

    fn load_ca_certificate(&self) -> Result<Certificate> {
        Ok(self.certificate.clone())
    }

    fn next_serial(&self) -> Result<u64> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |serial| {
                serial.checked_add(1)
            })
            .map_err(|_| IssuanceError::Store("serial space exhausted".to_string()))
    }

    fn record_issued_certificate(&self, certificate: &Certificate) -> Result<()> {
        self.issued
            .lock()
            .map_err(|_| IssuanceError::Store("issued list lock poisoned".to_string()))?
            .push(certificate.clone());
        Ok(())
    }
}

fn store_error(path: &Path, err: impl std::fmt::Display) -> IssuanceError {
    IssuanceError::Store(format!("{}: {err}", path.display()))
}

/// Writes `contents` to `path` through a sibling temporary file and a rename, so readers
/// see either the old or the new contents.
fn write_atomic(path: &Path, temp: &Path, contents: &[u8]) -> Result<()> {
    let mut file = File::create(temp).map_err(|e| store_error(temp, e))?;
    file.write_all(contents).map_err(|e| store_error(temp, e))?;
    file.sync_all().map_err(|e| store_error(temp, e))?;
    drop(file);
    fs::rename(temp, path).map_err(|e| store_error(path, e))
}

fn create_new(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(|e| store_error(path, e))?;
    file.write_all(contents).map_err(|e| store_error(path, e))?;
    file.sync_all().map_err(|e| store_error(path, e))
}

/// Keeps CA state in a directory.
///
/// Serial allocation is serialized by an in-process mutex; two processes must not share
/// one directory.
pub struct FileStore {
    root: PathBuf,
    key_passphrase: Option<Zeroizing<String>>,
    serial_lock: Mutex<()>,
}

impl FileStore {
    /// Opens an existing store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for file in [KEY_FILE, CERT_FILE] {
            let path = root.join(file);
            if !path.is_file() {
                return Err(store_error(&path, "missing"));
            }
        }
        let issued = root.join(ISSUED_DIR);
        fs::create_dir_all(&issued).map_err(|e| store_error(&issued, e))?;

        Ok(Self {
            root,
            key_passphrase: None,
            serial_lock: Mutex::new(()),
        })
    }

    /// Writes a new store into `root`, which is created if needed and must not already
    /// hold a CA.
    ///
    /// With a passphrase the key is written as encrypted PKCS#8 using `config`'s
    /// PBKDF2 work factor.
    pub fn initialize(
        root: impl Into<PathBuf>,
        key: &KeyPair,
        certificate: &Certificate,
        passphrase: Option<&str>,
        config: &KeyConfig,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| store_error(&root, e))?;

        let key_pem = match passphrase.filter(|p| !p.is_empty()) {
            Some(passphrase) => key.export_private_encrypted(passphrase, config)?,
            None => key.export_private_unencrypted()?,
        };
        create_new(&root.join(KEY_FILE), key_pem.as_bytes(), true)?;
        create_new(&root.join(CERT_FILE), certificate.to_pem()?.as_bytes(), false)?;
        create_new(
            &root.join(SERIAL_FILE),
            format!("{FIRST_SERIAL}\n").as_bytes(),
            false,
        )?;

        let store = Self::open(root)?;
        Ok(match passphrase {
            Some(passphrase) => store.with_key_passphrase(passphrase),
            None => store,
        })
    }

    /// Passphrase for an encrypted `ca.key`.
    pub fn with_key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.key_passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the certificate with `serial` is recorded.
    pub fn issued_path(&self, serial: u64) -> PathBuf {
        self.root.join(ISSUED_DIR).join(format!("{serial}.pem"))
    }

    fn read_serial(&self, path: &Path) -> Result<u64> {
        match fs::read_to_string(path) {
            Ok(contents) => match contents.trim().parse::<u64>() {
                Ok(0) => Err(store_error(path, "corrupt serial counter: zero")),
                Ok(serial) => Ok(serial),
                Err(e) => Err(store_error(path, format!("corrupt serial counter: {e}"))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FIRST_SERIAL),
            Err(e) => Err(store_error(path, e)),
        }
    }
}

impl CaStore for FileStore {
    fn load_ca_key(&self) -> Result<KeyPair> {
        let path = self.root.join(KEY_FILE);
        let material = Zeroizing::new(fs::read(&path).map_err(|e| store_error(&path, e))?);
        KeyPair::import(
            &material,
            self.key_passphrase.as_ref().map(|p| p.as_str()),
        )
    }

    fn load_ca_certificate(&self) -> Result<Certificate> {
        let path = self.root.join(CERT_FILE);
        let pem = fs::read(&path).map_err(|e| store_error(&path, e))?;
        Certificate::from_pem(pem)
    }

    fn next_serial(&self) -> Result<u64> {
        let _guard = self
            .serial_lock
            .lock()
            .map_err(|_| IssuanceError::Store("serial lock poisoned".to_string()))?;

        let path = self.root.join(SERIAL_FILE);
        let serial = self.read_serial(&path)?;
        let next = serial
            .checked_add(1)
            .ok_or_else(|| IssuanceError::Store("serial space exhausted".to_string()))?;
        write_atomic(
            &path,
            &self.root.join(SERIAL_TEMP_FILE),
            format!("{next}\n").as_bytes(),
        )?;
        Ok(serial)
    }

    fn record_issued_certificate(&self, certificate: &Certificate) -> Result<()> {
        let path = self.issued_path(certificate.serial()?);
        create_new(&path, certificate.to_pem()?.as_bytes(), false)
    }
}
