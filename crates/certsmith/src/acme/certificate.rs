//! Certificates, CSRs and the issuance seam
//!
//! [`CertificateObtainer`] is the only surface the renewal workflow sees of
//! the ACME protocol. Everything else in this module is parsing: held
//! certificates into [`CertificateRecord`], external CSRs into
//! [`CsrRequest`], and a downloaded chain into a [`CertificateResource`].

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ::pem::{EncodeConfig, LineEnding, Pem};
use rcgen::KeyPair;
use x509_parser::prelude::*;

use super::error::AcmeError;

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const CSR_TAGS: [&str; 2] = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

/// A parsed certificate held on disk
///
/// Domains are the subject CN first, then every DNS SAN that differs from
/// the CN, in certificate order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub domains: Vec<String>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
}

impl CertificateRecord {
    /// Parse one DER certificate
    pub fn from_der(der: &[u8]) -> Result<Self, AcmeError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| AcmeError::CertificateParse(e.to_string()))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        let sans = match cert.subject_alternative_name() {
            Ok(Some(ext)) => dns_names(&ext.value.general_names),
            Ok(None) => Vec::new(),
            Err(e) => return Err(AcmeError::CertificateParse(e.to_string())),
        };

        let is_ca = match cert.basic_constraints() {
            Ok(Some(ext)) => ext.value.ca,
            Ok(None) => false,
            Err(e) => return Err(AcmeError::CertificateParse(e.to_string())),
        };

        let timestamp = cert.validity().not_after.timestamp();
        let not_after = DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| AcmeError::CertificateParse("Invalid expiry timestamp".to_string()))?;

        Ok(Self {
            domains: extract_domains(common_name, sans),
            not_after,
            is_ca,
        })
    }

    /// Parse every certificate of a PEM bundle, in file order
    pub fn parse_bundle(pem_data: &[u8]) -> Result<Vec<Self>, AcmeError> {
        let blocks = ::pem::parse_many(pem_data)
            .map_err(|e| AcmeError::CertificateParse(format!("Failed to parse PEM: {}", e)))?;

        blocks
            .iter()
            .filter(|block| block.tag() == CERTIFICATE_TAG)
            .map(|block| Self::from_der(block.contents()))
            .collect()
    }

    /// Primary domain of the certificate
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }
}

/// A certificate signing request supplied by the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrRequest {
    /// DER encoding sent to the authority as is
    pub der: Vec<u8>,
    /// Subject common name, the primary domain
    pub common_name: String,
    /// CN first, then the DNS SANs that differ from it
    pub domains: Vec<String>,
}

impl CsrRequest {
    /// Parse a CSR file that is either PEM or raw DER
    pub fn parse(data: &[u8]) -> Result<Self, AcmeError> {
        let der = match ::pem::parse(data) {
            Ok(block) if CSR_TAGS.contains(&block.tag()) => block.into_contents(),
            Ok(block) => {
                return Err(AcmeError::CertificateParse(format!(
                    "Unexpected PEM block '{}' in CSR file",
                    block.tag()
                )))
            }
            Err(_) => data.to_vec(),
        };

        Self::from_der(der)
    }

    /// Parse a DER-encoded CSR
    pub fn from_der(der: Vec<u8>) -> Result<Self, AcmeError> {
        let (common_name, sans) = {
            let (_, csr) = X509CertificationRequest::from_der(&der)
                .map_err(|e| AcmeError::CertificateParse(format!("Invalid CSR: {}", e)))?;

            let common_name = csr
                .certification_request_info
                .subject
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string)
                .filter(|cn| !cn.is_empty());

            let mut sans = Vec::new();
            if let Some(extensions) = csr.requested_extensions() {
                for extension in extensions {
                    if let ParsedExtension::SubjectAlternativeName(san) = extension {
                        sans.extend(dns_names(&san.general_names));
                    }
                }
            }

            (common_name, sans)
        };

        let common_name = common_name.ok_or_else(|| {
            AcmeError::CertificateParse("CSR has no subject common name".to_string())
        })?;
        let domains = extract_domains(Some(common_name.clone()), sans);

        Ok(Self {
            der,
            common_name,
            domains,
        })
    }
}

fn dns_names(names: &[GeneralName<'_>]) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect()
}

fn extract_domains(common_name: Option<String>, sans: Vec<String>) -> Vec<String> {
    let common_name = common_name.filter(|cn| !cn.is_empty());
    let mut domains: Vec<String> = common_name.iter().cloned().collect();
    domains.extend(
        sans.into_iter()
            .filter(|san| Some(san) != common_name.as_ref()),
    );
    domains
}

/// Parameters of a domain-list issuance
pub struct ObtainRequest {
    pub domains: Vec<String>,
    /// Keep the issuer chain in the `.crt` file
    pub bundle: bool,
    /// Reuse this key instead of generating a fresh one
    pub private_key: Option<KeyPair>,
    /// Request the OCSP must-staple TLS feature
    pub must_staple: bool,
}

impl fmt::Debug for ObtainRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObtainRequest")
            .field("domains", &self.domains)
            .field("bundle", &self.bundle)
            .field("reuse_key", &self.private_key.is_some())
            .field("must_staple", &self.must_staple)
            .finish()
    }
}

/// An issued certificate, ready to be stored
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateResource {
    /// Primary domain, names the files on disk
    pub domain: String,
    pub domains: Vec<String>,
    /// Leaf certificate, followed by the chain when bundled
    pub certificate_pem: String,
    /// Issuer chain without the leaf
    pub issuer_pem: String,
    /// `None` when the key belongs to an external CSR
    pub private_key_pem: Option<String>,
    pub expires: DateTime<Utc>,
}

impl CertificateResource {
    /// Split a downloaded chain into leaf and issuer parts
    pub fn from_chain(
        domain: &str,
        domains: Vec<String>,
        chain_pem: &str,
        private_key_pem: Option<String>,
        bundle: bool,
    ) -> Result<Self, AcmeError> {
        let blocks: Vec<Pem> = ::pem::parse_many(chain_pem)
            .map_err(|e| AcmeError::CertificateParse(format!("Failed to parse chain: {}", e)))?
            .into_iter()
            .filter(|block| block.tag() == CERTIFICATE_TAG)
            .collect();

        let Some((leaf, issuers)) = blocks.split_first() else {
            return Err(AcmeError::CertificateParse(
                "Certificate chain is empty".to_string(),
            ));
        };

        let expires = CertificateRecord::from_der(leaf.contents())?.not_after;

        let certificate_pem = if bundle {
            encode(&blocks)
        } else {
            encode(std::slice::from_ref(leaf))
        };

        Ok(Self {
            domain: domain.to_string(),
            domains,
            certificate_pem,
            issuer_pem: encode(issuers),
            private_key_pem,
            expires,
        })
    }
}

impl fmt::Debug for CertificateResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateResource")
            .field("domain", &self.domain)
            .field("domains", &self.domains)
            .field("expires", &self.expires)
            .field("has_private_key", &self.private_key_pem.is_some())
            .finish()
    }
}

fn encode(blocks: &[Pem]) -> String {
    ::pem::encode_many_config(blocks, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

/// Issues certificates from the authority
#[async_trait]
pub trait CertificateObtainer: Send + Sync {
    /// Issue a certificate for a list of domains
    async fn obtain(&self, request: ObtainRequest) -> Result<CertificateResource, AcmeError>;

    /// Issue a certificate for an external CSR
    async fn obtain_for_csr(
        &self,
        csr: &CsrRequest,
        bundle: bool,
    ) -> Result<CertificateResource, AcmeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa};

    fn self_signed(cn: &str, sans: &[&str], is_ca: bool) -> rcgen::Certificate {
        let mut params =
            CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        if is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        }
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap()
    }

    #[test]
    fn test_record_domain_order() {
        let cert = self_signed("b.com", &["a.com", "b.com", "c.com"], false);
        let records = CertificateRecord::parse_bundle(cert.pem().as_bytes()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].domains, vec!["b.com", "a.com", "c.com"]);
        assert_eq!(records[0].primary_domain(), Some("b.com"));
        assert!(!records[0].is_ca);
    }

    #[test]
    fn test_record_detects_ca() {
        let cert = self_signed("Test CA", &[], true);
        let records = CertificateRecord::parse_bundle(cert.pem().as_bytes()).unwrap();
        assert!(records[0].is_ca);
    }

    #[test]
    fn test_parse_bundle_rejects_garbage() {
        let err = CertificateRecord::parse_bundle(
            b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n",
        )
        .unwrap_err();
        assert!(matches!(err, AcmeError::CertificateParse(_)));
    }

    #[test]
    fn test_chain_split() {
        let leaf = self_signed("example.com", &["example.com"], false);
        let issuer = self_signed("Test CA", &[], true);
        let chain = format!("{}{}", leaf.pem(), issuer.pem());

        let bundled = CertificateResource::from_chain(
            "example.com",
            vec!["example.com".to_string()],
            &chain,
            Some("key".to_string()),
            true,
        )
        .unwrap();
        assert_eq!(::pem::parse_many(&bundled.certificate_pem).unwrap().len(), 2);
        assert_eq!(::pem::parse_many(&bundled.issuer_pem).unwrap().len(), 1);

        let leaf_only = CertificateResource::from_chain(
            "example.com",
            vec!["example.com".to_string()],
            &chain,
            None,
            false,
        )
        .unwrap();
        let blocks = ::pem::parse_many(&leaf_only.certificate_pem).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].contents(), leaf.der().as_ref());
        assert_eq!(leaf_only.issuer_pem, bundled.issuer_pem);
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err = CertificateResource::from_chain("a.com", Vec::new(), "", None, true).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    fn csr_for(cn: Option<&str>, sans: &[&str]) -> rcgen::CertificateSigningRequest {
        let mut params =
            CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        let mut dn = DistinguishedName::new();
        if let Some(cn) = cn {
            dn.push(DnType::CommonName, cn);
        }
        params.distinguished_name = dn;
        let key = KeyPair::generate().unwrap();
        params.serialize_request(&key).unwrap()
    }

    #[test]
    fn test_csr_from_pem_and_der() {
        let csr = csr_for(Some("example.com"), &["example.com", "www.example.com"]);

        let from_pem = CsrRequest::parse(csr.pem().unwrap().as_bytes()).unwrap();
        assert_eq!(from_pem.common_name, "example.com");
        assert_eq!(from_pem.domains, vec!["example.com", "www.example.com"]);

        let from_der = CsrRequest::parse(csr.der().as_ref()).unwrap();
        assert_eq!(from_der, from_pem);
    }

    #[test]
    fn test_csr_without_common_name() {
        let csr = csr_for(None, &["example.com"]);
        let err = CsrRequest::parse(csr.der().as_ref()).unwrap_err();
        assert!(err.to_string().contains("common name"));
    }

    #[test]
    fn test_obtain_request_debug_hides_key() {
        let request = ObtainRequest {
            domains: vec!["a.com".to_string()],
            bundle: true,
            private_key: Some(KeyPair::generate().unwrap()),
            must_staple: false,
        };
        let debug = format!("{:?}", request);
        assert!(debug.contains("reuse_key: true"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
