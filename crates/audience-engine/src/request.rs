//! Signal request URL assembly.

use crate::error::{AudienceError, AudienceResult};
use crate::identity::VisitorIdentity;
use crate::settings::AudienceSettings;
use std::collections::BTreeMap;
use url::Url;

/// Lifecycle context-data keys and the names the server expects for them.
/// Keys not listed here are not sent.
const LIFECYCLE_KEY_MAP: &[(&str, &str)] = &[
    ("appid", "a.AppID"),
    ("carriername", "a.CarrierName"),
    ("crashevent", "a.CrashEvent"),
    ("dailyenguserevent", "a.DailyEngUserEvent"),
    ("dayofweek", "a.DayOfWeek"),
    ("dayssincefirstuse", "a.DaysSinceFirstUse"),
    ("dayssincelastuse", "a.DaysSinceLastUse"),
    ("dayssincelastupgrade", "a.DaysSinceLastUpgrade"),
    ("devicename", "a.DeviceName"),
    ("hourofday", "a.HourOfDay"),
    ("ignoredsessionlength", "a.ignoredSessionLength"),
    ("installdate", "a.InstallDate"),
    ("installevent", "a.InstallEvent"),
    ("launchevent", "a.LaunchEvent"),
    ("launches", "a.Launches"),
    ("launchessinceupgrade", "a.LaunchesSinceUpgrade"),
    ("locale", "a.locale"),
    ("monthlyenguserevent", "a.MonthlyEngUserEvent"),
    ("osversion", "a.OSVersion"),
    ("prevsessionlength", "a.PrevSessionLength"),
    ("resolution", "a.Resolution"),
    ("runmode", "a.RunMode"),
    ("upgradeevent", "a.UpgradeEvent"),
];

/// Rename lifecycle keys to their server names, dropping unknown keys.
pub fn map_lifecycle_keys(data: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    LIFECYCLE_KEY_MAP
        .iter()
        .filter_map(|(from, to)| data.get(*from).map(|v| (to.to_string(), v.clone())))
        .collect()
}

/// Everything besides the traits that goes into a signal URL.
pub struct RequestContext<'a> {
    pub settings: &'a AudienceSettings,
    pub identity: &'a VisitorIdentity,
    pub uuid: &'a str,
    pub platform: &'a str,
}

impl RequestContext<'_> {
    /// Build `https://{server}/event?...` for `traits`.
    pub fn signal_url(&self, traits: &BTreeMap<String, String>) -> AudienceResult<String> {
        let server = self
            .settings
            .server
            .as_deref()
            .ok_or(AudienceError::MissingConfig("audience.server"))?;

        let mut url = base_url(server, "event")?;
        {
            let mut query = url.query_pairs_mut();

            for (key, value) in traits {
                if key.is_empty() {
                    continue;
                }
                query.append_pair(&format!("c_{}", key.replace('.', "_")), value);
            }

            if let Some(ecid) = &self.identity.ecid {
                query.append_pair("d_mid", ecid);
            }
            if let Some(blob) = &self.identity.blob {
                query.append_pair("d_blob", blob);
            }
            if let Some(hint) = &self.identity.location_hint {
                query.append_pair("dcs_region", hint);
            }
            for customer in &self.identity.customer_ids {
                query.append_pair(
                    "d_cid_ic",
                    &format!(
                        "{}\u{1}{}\u{1}{}",
                        customer.id_type, customer.id, customer.auth_state as i32
                    ),
                );
            }

            if !self.uuid.is_empty() {
                query.append_pair("d_uuid", self.uuid);
            }
            if let Some(org) = &self.settings.org_id {
                query.append_pair("d_orgid", org);
            }
            query.append_pair("d_ptfm", self.platform);
            query.append_pair("d_dst", "1");
            query.append_pair("d_rtbd", "json");
        }

        Ok(url.into())
    }
}

/// Build the opt-out hit `https://{server}/demoptout.jpg?d_uuid={uuid}`.
pub fn opt_out_url(server: &str, uuid: &str) -> AudienceResult<String> {
    let mut url = base_url(server, "demoptout.jpg")?;
    url.query_pairs_mut().append_pair("d_uuid", uuid);
    Ok(url.into())
}

/// `server` is normally a bare host; a full http(s) origin is accepted too.
fn base_url(server: &str, path: &str) -> AudienceResult<Url> {
    let server = server.trim_end_matches('/');
    let origin = if server.starts_with("https://") || server.starts_with("http://") {
        server.to_string()
    } else {
        format!("https://{server}")
    };
    Ok(Url::parse(&format!("{origin}/{path}"))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AuthState, CustomerId};

    fn settings() -> AudienceSettings {
        AudienceSettings {
            server: Some("dpm.demdex.net".to_string()),
            org_id: Some("ORG@AdobeOrg".to_string()),
            ..Default::default()
        }
    }

    fn traits(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_minimal_signal_url() {
        let settings = AudienceSettings {
            org_id: None,
            ..settings()
        };
        let identity = VisitorIdentity::default();
        let ctx = RequestContext {
            settings: &settings,
            identity: &identity,
            uuid: "",
            platform: "rust",
        };

        let url = ctx.signal_url(&traits(&[("k", "v")])).unwrap();
        assert_eq!(
            url,
            "https://dpm.demdex.net/event?c_k=v&d_ptfm=rust&d_dst=1&d_rtbd=json"
        );
    }

    #[test]
    fn test_full_signal_url() {
        let settings = settings();
        let identity = VisitorIdentity {
            ecid: Some("mid1".to_string()),
            blob: Some("b1".to_string()),
            location_hint: Some("9".to_string()),
            customer_ids: vec![CustomerId {
                id_type: "crm".to_string(),
                id: "abc".to_string(),
                auth_state: AuthState::Authenticated,
            }],
        };
        let ctx = RequestContext {
            settings: &settings,
            identity: &identity,
            uuid: "u1",
            platform: "rust",
        };

        let url = ctx
            .signal_url(&traits(&[("a.b", "x y"), ("", "skipped")]))
            .unwrap();
        assert_eq!(
            url,
            "https://dpm.demdex.net/event?c_a_b=x+y&d_mid=mid1&d_blob=b1&dcs_region=9\
             &d_cid_ic=crm%01abc%011&d_uuid=u1&d_orgid=ORG%40AdobeOrg&d_ptfm=rust\
             &d_dst=1&d_rtbd=json"
        );
    }

    #[test]
    fn test_missing_server() {
        let settings = AudienceSettings::default();
        let identity = VisitorIdentity::default();
        let ctx = RequestContext {
            settings: &settings,
            identity: &identity,
            uuid: "",
            platform: "rust",
        };
        assert!(matches!(
            ctx.signal_url(&BTreeMap::new()),
            Err(AudienceError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_server_with_scheme() {
        assert_eq!(
            opt_out_url("http://localhost:8080/", "u1").unwrap(),
            "http://localhost:8080/demoptout.jpg?d_uuid=u1"
        );
        assert_eq!(
            opt_out_url("dpm.demdex.net", "u1").unwrap(),
            "https://dpm.demdex.net/demoptout.jpg?d_uuid=u1"
        );
    }

    #[test]
    fn test_lifecycle_key_mapping() {
        let mapped = map_lifecycle_keys(&traits(&[
            ("appid", "MyApp 1.0"),
            ("launches", "3"),
            ("notalifecyclekey", "x"),
        ]));

        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped["a.AppID"], "MyApp 1.0");
        assert_eq!(mapped["a.Launches"], "3");
    }
}
