//! Self-signed certificates for app-only (certificate) authentication

use super::run_command;
use crate::config::{AuthType, ConfigManager};
use crate::error::{M365Error, Result};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// SHA-1 thumbprint of a DER certificate in the two forms Azure uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbprint {
    /// Uppercase hex, as shown in the Entra portal
    pub hex: String,
    /// base64url, as carried in a JWT `x5t` header
    pub x5t: String,
}

impl Thumbprint {
    pub fn from_der(der: &[u8]) -> Self {
        let digest = Sha1::digest(der);
        Self {
            hex: digest.iter().map(|b| format!("{:02X}", b)).collect(),
            x5t: URL_SAFE_NO_PAD.encode(digest),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertificateFiles {
    pub key: PathBuf,
    pub pem: PathBuf,
    pub cer: PathBuf,
    pub thumbprint: Thumbprint,
}

/// First CERTIFICATE block of a PEM document, decoded
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    const END: &str = "-----END CERTIFICATE-----";

    let start = pem
        .find(BEGIN)
        .ok_or_else(|| M365Error::InvalidConfig("no CERTIFICATE block in PEM".into()))?
        + BEGIN.len();
    let end = pem[start..]
        .find(END)
        .ok_or_else(|| M365Error::InvalidConfig("unterminated CERTIFICATE block".into()))?
        + start;

    let body: String = pem[start..end].chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(body)
        .map_err(|e| M365Error::InvalidConfig(format!("invalid certificate base64: {}", e)))
}

pub fn thumbprint_from_pem_file(path: &Path) -> Result<Thumbprint> {
    let pem = fs::read_to_string(path)?;
    Ok(Thumbprint::from_der(&pem_to_der(&pem)?))
}

/// `x5t` for a hex thumbprint (separators allowed)
pub fn x5t_from_hex(hex: &str) -> Result<String> {
    let digits: Vec<char> = hex.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if digits.len() != 40 {
        return Err(M365Error::InvalidConfig(format!(
            "certificate thumbprint must be 40 hex digits, got {}",
            digits.len()
        )));
    }

    let bytes = digits
        .chunks(2)
        .map(|pair| {
            let s: String = pair.iter().collect();
            u8::from_str_radix(&s, 16)
                .map_err(|e| M365Error::InvalidConfig(format!("invalid thumbprint: {}", e)))
        })
        .collect::<Result<Vec<u8>>>()?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Create `<name>.key`, `<name>.pem` and `<name>.cer` in `out_dir`
pub async fn create_certificate(
    name: &str,
    days: u32,
    out_dir: &Path,
) -> Result<CertificateFiles> {
    if days == 0 {
        return Err(M365Error::InvalidConfig(
            "certificate validity must be at least one day".into(),
        ));
    }
    fs::create_dir_all(out_dir)?;

    let stem = crate::report::sanitize_filename(name);
    let key = out_dir.join(format!("{}.key", stem));
    let pem = out_dir.join(format!("{}.pem", stem));
    let cer = out_dir.join(format!("{}.cer", stem));

    let key_arg = key.to_string_lossy().to_string();
    let pem_arg = pem.to_string_lossy().to_string();
    let days_arg = days.to_string();
    let subject = format!("/CN={}", name);

    run_command(
        "openssl",
        &[
            "req", "-x509", "-newkey", "rsa:2048", "-sha256", "-nodes", "-keyout", &key_arg,
            "-out", &pem_arg, "-days", &days_arg, "-subj", &subject,
        ],
        None,
        None,
    )
    .await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&key, fs::Permissions::from_mode(0o600))?;
    }

    let der = pem_to_der(&fs::read_to_string(&pem)?)?;
    fs::write(&cer, &der)?;
    let thumbprint = Thumbprint::from_der(&der);

    info!(name, thumbprint = %thumbprint.hex, "Certificate created");
    Ok(CertificateFiles {
        key,
        pem,
        cer,
        thumbprint,
    })
}

/// Point a tenant at a certificate and switch it to certificate auth
pub fn attach_to_tenant(
    manager: &ConfigManager,
    tenant_name: &str,
    files: &CertificateFiles,
) -> Result<()> {
    let mut tenants = manager.load_tenants()?;
    let tenant = tenants
        .iter_mut()
        .find(|t| t.name.eq_ignore_ascii_case(tenant_name))
        .ok_or_else(|| M365Error::TenantNotFound(tenant_name.to_string()))?;

    tenant.certificate_path = Some(files.pem.clone());
    tenant.certificate_key_path = Some(files.key.clone());
    tenant.certificate_thumbprint = Some(files.thumbprint.hex.clone());
    tenant.auth_type = AuthType::Certificate;

    manager.save_tenants(&tenants)
}
