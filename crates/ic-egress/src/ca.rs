// ca.rs — The IronCurtain certificate authority.
//
// One CA per $IRONCURTAIN_HOME, generated on first run: 10-year validity,
// basic-constraints CA=true, key on disk with mode 0600. Containers trust
// ca-cert.pem; the proxy signs one leaf per CONNECT host (cached).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair,
};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::EgressError;

const CA_CERT_FILE: &str = "ca-cert.pem";
const CA_KEY_FILE: &str = "ca-key.pem";
const VALIDITY_DAYS: i64 = 3650;

/// A per-host leaf ready to hand to rustls.
pub struct LeafIdentity {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// The CA plus a leaf cache.
pub struct CertificateAuthority {
    cert: Certificate,
    key: KeyPair,
    cert_pem: String,
    /// The on-disk CA certificate in DER form — chains must carry exactly
    /// what the container trust store was given.
    ca_der: CertificateDer<'static>,
    leaves: Mutex<HashMap<String, (Vec<u8>, Vec<u8>)>>,
}

impl CertificateAuthority {
    /// Load the CA from `dir`, generating it on first run.
    pub fn load_or_generate(dir: impl AsRef<Path>) -> Result<Self, EgressError> {
        let dir = dir.as_ref();
        let cert_path = dir.join(CA_CERT_FILE);
        let key_path = dir.join(CA_KEY_FILE);

        if cert_path.exists() && key_path.exists() {
            let cert_pem = read(&cert_path)?;
            let key_pem = read(&key_path)?;
            let key = KeyPair::from_pem(&key_pem)?;
            let params = CertificateParams::from_ca_cert_pem(&cert_pem)?;
            let cert = params.self_signed(&key)?;
            let ca_der = parse_ca_der(&cert_pem, &cert_path)?;
            return Ok(Self {
                cert,
                key,
                cert_pem,
                ca_der,
                leaves: Mutex::new(HashMap::new()),
            });
        }

        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "IronCurtain CA");
        params
            .distinguished_name
            .push(DnType::OrganizationName, "IronCurtain");
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::days(1);
        params.not_after = now + time::Duration::days(VALIDITY_DAYS);

        let key = KeyPair::generate()?;
        let cert = params.self_signed(&key)?;
        let cert_pem = cert.pem();

        write(dir, &cert_path, cert_pem.as_bytes(), 0o644)?;
        write(dir, &key_path, key.serialize_pem().as_bytes(), 0o600)?;
        tracing::info!(dir = %dir.display(), "generated IronCurtain CA");

        let ca_der = cert.der().clone();
        Ok(Self {
            cert,
            key,
            cert_pem,
            ca_der,
            leaves: Mutex::new(HashMap::new()),
        })
    }

    /// The PEM the container's trust store gets.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Issue (or fetch from cache) a leaf certificate for one host.
    pub fn issue_leaf(&self, host: &str) -> Result<LeafIdentity, EgressError> {
        if let Ok(leaves) = self.leaves.lock() {
            if let Some((cert_der, key_der)) = leaves.get(host) {
                return Ok(LeafIdentity {
                    chain: vec![CertificateDer::from(cert_der.clone()), self.ca_der.clone()],
                    key: PrivatePkcs8KeyDer::from(key_der.clone()).into(),
                });
            }
        }

        let mut params = CertificateParams::new(vec![host.to_string()])?;
        params.distinguished_name.push(DnType::CommonName, host);
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::days(1);
        params.not_after = now + time::Duration::days(397);

        let leaf_key = KeyPair::generate()?;
        let leaf = params.signed_by(&leaf_key, &self.cert, &self.key)?;

        let cert_der = leaf.der().to_vec();
        let key_der = leaf_key.serialize_der();
        if let Ok(mut leaves) = self.leaves.lock() {
            leaves.insert(host.to_string(), (cert_der.clone(), key_der.clone()));
        }

        Ok(LeafIdentity {
            chain: vec![CertificateDer::from(cert_der), self.ca_der.clone()],
            key: PrivatePkcs8KeyDer::from(key_der).into(),
        })
    }
}

/// Parse the first certificate out of the on-disk CA PEM.
fn parse_ca_der(
    cert_pem: &str,
    path: &Path,
) -> Result<CertificateDer<'static>, EgressError> {
    rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .next()
        .transpose()
        .map_err(|source| EgressError::CaIo {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| EgressError::CaIo {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "no certificate in ca-cert.pem",
            ),
        })
}

fn read(path: &Path) -> Result<String, EgressError> {
    std::fs::read_to_string(path).map_err(|source| EgressError::CaIo {
        path: path.to_path_buf(),
        source,
    })
}

fn write(dir: &Path, path: &PathBuf, contents: &[u8], mode: u32) -> Result<(), EgressError> {
    let io_err = |source| EgressError::CaIo {
        path: path.clone(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    std::fs::write(path, contents).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_generates_ca_files() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::load_or_generate(dir.path()).unwrap();

        assert!(dir.path().join("ca-cert.pem").exists());
        assert!(dir.path().join("ca-key.pem").exists());
        assert!(ca.cert_pem().contains("BEGIN CERTIFICATE"));
    }

    #[cfg(unix)]
    #[test]
    fn ca_key_is_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let _ca = CertificateAuthority::load_or_generate(dir.path()).unwrap();
        let mode = std::fs::metadata(dir.path().join("ca-key.pem"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn second_run_reuses_the_ca() {
        let dir = tempfile::tempdir().unwrap();
        let first = CertificateAuthority::load_or_generate(dir.path()).unwrap();
        let second = CertificateAuthority::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.cert_pem(), second.cert_pem());
    }

    #[test]
    fn leaves_chain_to_the_ca() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::load_or_generate(dir.path()).unwrap();

        let leaf = ca.issue_leaf("api.anthropic.com").unwrap();
        assert_eq!(leaf.chain.len(), 2);

        // Cached second issuance is identical.
        let again = ca.issue_leaf("api.anthropic.com").unwrap();
        assert_eq!(leaf.chain[0], again.chain[0]);
    }
}
