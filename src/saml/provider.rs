use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use openssl::pkey::{PKey, Private};
use samael::{
    metadata::EntityDescriptor, schema::Assertion, service_provider::ServiceProviderBuilder,
    traits::ToXml,
};
use uuid::Uuid;

use super::{SamlError, mock};
use crate::config::{AuthnBinding, SamlProviderConfig};

/// Back-channel timeout for artifact resolution.
const ARTIFACT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// What the authorize endpoint must send the browser to start the upstream
/// login.
#[derive(Debug, Clone)]
pub enum AuthnRequestEnvelope {
    /// 302 to the IdP with the request in the query string.
    Redirect { url: String },
    /// Auto-submitting form POST to the IdP.
    Post {
        sso_url: String,
        saml_request: String,
        relay_state: String,
    },
    /// Local mock IdP page.
    Mock { url: String },
}

/// Identity extracted from a resolved assertion.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub name_id: String,
    /// Attribute statements flattened into a JSON object. Multi-valued
    /// attributes become arrays.
    pub attributes: serde_json::Value,
}

/// One configured upstream identity provider.
///
/// Key and certificate material is loaded once at construction; the
/// instance is shared read-only across requests.
pub struct SamlIdentityProvider {
    name: String,
    config: SamlProviderConfig,
    idp_certificate: Option<String>,
    sp_private_key: Option<String>,
    http_client: reqwest::Client,
}

impl SamlIdentityProvider {
    pub fn from_config(name: &str, config: &SamlProviderConfig) -> Result<Self, SamlError> {
        let idp_certificate = read_pem(config.idp_certificate.as_deref())?;
        let sp_private_key = read_pem(config.sp_private_key.as_deref())?;
        let sp_certificate = read_pem(config.sp_certificate.as_deref())?;

        let mut builder = reqwest::Client::builder().timeout(ARTIFACT_RESOLVE_TIMEOUT);
        if !config.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        // Some IdPs require mutual TLS on the artifact-resolution channel.
        if let (Some(key), Some(cert)) = (&sp_private_key, &sp_certificate) {
            let identity = reqwest::Identity::from_pem(format!("{}\n{}", key, cert).as_bytes())
                .map_err(|e| {
                    SamlError::Internal(format!(
                        "identity provider '{}': invalid client key/certificate pair: {}",
                        name, e
                    ))
                })?;
            builder = builder.identity(identity);
        }
        let http_client = builder
            .build()
            .map_err(|e| SamlError::Internal(format!("http client: {}", e)))?;

        Ok(Self {
            name: name.to_string(),
            config: config.clone(),
            idp_certificate,
            sp_private_key,
            http_client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binding(&self) -> AuthnBinding {
        self.config.binding
    }

    pub fn allow_scoping(&self) -> bool {
        self.config.allow_scoping
    }

    /// Cluster this instance fronts, passed back in as the hint on every
    /// request this broker initiates.
    pub fn default_cluster(&self) -> Option<&str> {
        self.config.cluster.as_deref()
    }

    /// Build the front-channel request that sends the user to this IdP,
    /// carrying `relay_state` through the round-trip. A cluster-name hint
    /// switches the request to that cluster's registered SP entity ID.
    pub fn create_authn_request(
        &self,
        relay_state: &str,
        authorization_by_proxy: bool,
        cluster_name: Option<&str>,
    ) -> Result<AuthnRequestEnvelope, SamlError> {
        if authorization_by_proxy && !self.config.allow_scoping {
            return Err(SamlError::ScopingAttributesNotAllowed);
        }

        if self.config.binding == AuthnBinding::Mock {
            let url = format!(
                "/mock-idp?RelayState={}",
                urlencode(relay_state)
            );
            return Ok(AuthnRequestEnvelope::Mock { url });
        }

        let sp = self.build_service_provider(self.entity_id_for(cluster_name))?;
        let authn_request = sp
            .make_authentication_request(&self.config.sso_url)
            .map_err(|e| SamlError::Internal(format!("failed to create AuthnRequest: {}", e)))?;

        match self.config.binding {
            AuthnBinding::Redirect => {
                let url = if self.config.sign_requests {
                    let private_key = self.load_private_key()?;
                    authn_request
                        .signed_redirect(relay_state, &private_key)
                        .map_err(|e| {
                            SamlError::Internal(format!("failed to sign AuthnRequest: {}", e))
                        })?
                } else {
                    authn_request.redirect(relay_state).map_err(|e| {
                        SamlError::Internal(format!("failed to encode AuthnRequest: {}", e))
                    })?
                };
                let url = url.ok_or_else(|| {
                    SamlError::Internal("AuthnRequest has no destination".to_string())
                })?;
                Ok(AuthnRequestEnvelope::Redirect {
                    url: url.to_string(),
                })
            }
            AuthnBinding::Post => {
                let xml = authn_request.to_string().map_err(|e| {
                    SamlError::Internal(format!("failed to serialize AuthnRequest: {:?}", e))
                })?;
                Ok(AuthnRequestEnvelope::Post {
                    sso_url: self.config.sso_url.clone(),
                    saml_request: STANDARD.encode(xml.as_bytes()),
                    relay_state: relay_state.to_string(),
                })
            }
            AuthnBinding::Mock => unreachable!("handled above"),
        }
    }

    /// Trade an artifact for the assertion it references and extract the
    /// identity from it.
    ///
    /// Transport failures surface as `ProviderUnreachable`; anything wrong
    /// with the response itself collapses to `Unauthorized` with the detail
    /// logged, so the caller never leaks upstream internals.
    pub async fn resolve_artifact(&self, artifact: &str) -> Result<ResolvedIdentity, SamlError> {
        if self.config.binding == AuthnBinding::Mock {
            let subject = mock::decode_mock_artifact(artifact).ok_or_else(|| {
                tracing::warn!(idp = %self.name, "malformed mock artifact");
                SamlError::Unauthorized
            })?;
            return Ok(ResolvedIdentity {
                name_id: subject,
                attributes: serde_json::json!({}),
            });
        }

        let envelope = self.build_artifact_resolve_envelope(artifact);
        let response = self
            .http_client
            .post(&self.config.artifact_resolve_url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "http://www.oasis-open.org/committees/security")
            .body(envelope)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(idp = %self.name, error = %e, "artifact resolution transport failure");
                SamlError::ProviderUnreachable(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            tracing::error!(idp = %self.name, error = %e, "failed to read artifact response body");
            SamlError::ProviderUnreachable(e.to_string())
        })?;

        if !status.is_success() {
            tracing::warn!(idp = %self.name, status = %status, "artifact resolution returned an error status");
            return Err(SamlError::Unauthorized);
        }

        self.extract_identity(&body)
    }

    /// Pull the embedded samlp:Response out of the SOAP body and run it
    /// through samael's validating parser.
    fn extract_identity(&self, soap_body: &str) -> Result<ResolvedIdentity, SamlError> {
        let response_xml = extract_saml_response(soap_body).ok_or_else(|| {
            tracing::warn!(idp = %self.name, "artifact response carries no samlp:Response");
            SamlError::Unauthorized
        })?;

        let sp = self.build_service_provider(self.config.sp_entity_id.clone())?;
        let assertion = sp
            .parse_base64_response(&STANDARD.encode(response_xml.as_bytes()), None)
            .map_err(|e| {
                tracing::warn!(idp = %self.name, error = %e, "assertion validation failed");
                SamlError::Unauthorized
            })?;

        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.clone())
            .ok_or_else(|| {
                tracing::warn!(idp = %self.name, "assertion missing NameID");
                SamlError::Unauthorized
            })?;

        Ok(ResolvedIdentity {
            attributes: attributes_to_json(&assertion),
            name_id,
        })
    }

    fn build_artifact_resolve_envelope(&self, artifact: &str) -> String {
        format!(
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <samlp:ArtifactResolve xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_{}" Version="2.0" IssueInstant="{}" Destination="{}">
      <saml:Issuer>{}</saml:Issuer>
      <samlp:Artifact>{}</samlp:Artifact>
    </samlp:ArtifactResolve>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
            Uuid::new_v4(),
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            xml_escape(&self.config.artifact_resolve_url),
            xml_escape(&self.config.sp_entity_id),
            xml_escape(artifact),
        )
    }

    /// The SP entity ID to present: the cluster's registered one when a
    /// known hint is given, the plain one otherwise.
    fn entity_id_for(&self, cluster_name: Option<&str>) -> String {
        if let Some(cluster) = cluster_name {
            if let Some(entity_id) = self.config.clusters.get(cluster) {
                return entity_id.clone();
            }
            tracing::debug!(idp = %self.name, cluster = %cluster, "unknown cluster hint, using the plain entity id");
        }
        self.config.sp_entity_id.clone()
    }

    fn build_service_provider(
        &self,
        entity_id: String,
    ) -> Result<samael::service_provider::ServiceProvider, SamlError> {
        let idp_metadata = self.build_idp_metadata()?;
        ServiceProviderBuilder::default()
            .entity_id(entity_id)
            .acs_url(self.config.acs_url.clone())
            .idp_metadata(idp_metadata)
            .authn_name_id_format(self.config.name_id_format.clone().unwrap_or_default())
            .build()
            .map_err(|e| SamlError::Internal(format!("failed to build service provider: {}", e)))
    }

    /// Minimal EntityDescriptor assembled from the configured certificate
    /// and endpoints; these IdPs publish no fetchable metadata document.
    fn build_idp_metadata(&self) -> Result<EntityDescriptor, SamlError> {
        let certificate = self.idp_certificate.as_deref().ok_or_else(|| {
            SamlError::Internal(format!(
                "identity provider '{}' has no idp_certificate",
                self.name
            ))
        })?;
        let xml = format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{}">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <ds:X509Data>
                    <ds:X509Certificate>{}</ds:X509Certificate>
                </ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>
        <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="{}"/>
    </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
            xml_escape(&self.config.idp_entity_id),
            strip_pem_headers(certificate),
            xml_escape(&self.config.sso_url),
        );

        samael::metadata::de::from_str(&xml)
            .map_err(|e| SamlError::Internal(format!("failed to build IdP metadata: {}", e)))
    }

    fn load_private_key(&self) -> Result<PKey<Private>, SamlError> {
        let pem = self.sp_private_key.as_deref().ok_or_else(|| {
            SamlError::Internal(format!(
                "identity provider '{}': sign_requests is enabled but sp_private_key is not configured",
                self.name
            ))
        })?;
        PKey::private_key_from_pem(pem.as_bytes())
            .map_err(|e| SamlError::Internal(format!("failed to parse sp private key: {}", e)))
    }
}

fn read_pem(path: Option<&str>) -> Result<Option<String>, SamlError> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| SamlError::Internal(format!("failed to read {}: {}", path, e))),
        None => Ok(None),
    }
}

fn strip_pem_headers(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----BEGIN") && !line.starts_with("-----END"))
        .collect::<Vec<_>>()
        .join("")
}

/// Locate the samlp:Response element inside a SOAP envelope, whatever
/// namespace prefix the IdP chose for it.
fn extract_saml_response(soap_body: &str) -> Option<String> {
    let open = soap_body.find(":Response").and_then(|pos| {
        // Walk back to the element's '<'.
        soap_body[..pos].rfind('<')
    })?;
    let prefix_end = soap_body[open..].find(":Response")? + open;
    let prefix = &soap_body[open + 1..prefix_end];
    let close_tag = format!("</{}:Response>", prefix);
    let close = soap_body.find(&close_tag)?;
    Some(soap_body[open..close + close_tag.len()].to_string())
}

fn attributes_to_json(assertion: &Assertion) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(statements) = assertion.attribute_statements.as_ref() {
        for statement in statements {
            for attr in &statement.attributes {
                let Some(name) = attr.name.as_deref().or(attr.friendly_name.as_deref()) else {
                    continue;
                };
                let values: Vec<serde_json::Value> = attr
                    .values
                    .iter()
                    .filter_map(|v| v.value.clone())
                    .map(serde_json::Value::String)
                    .collect();
                let value = match values.len() {
                    0 => continue,
                    1 => values.into_iter().next().unwrap_or_default(),
                    _ => serde_json::Value::Array(values),
                };
                map.insert(name.to_string(), value);
            }
        }
    }
    serde_json::Value::Object(map)
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
