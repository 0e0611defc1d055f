//! Autodesk Platform Services Model Coordination client.
//!
//! Clash results are published per clash test as three JSON resources
//! (clashes, clash instances, documents), each optionally gzip-compressed.
//! The client walks: latest model set version, its clash tests, each test's
//! resources, then joins the three resources into [`ClashRecord`]s.
//!
//! Token acquisition is not handled here: a bearer token is taken from
//! configuration as-is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info, warn};

use super::ClashSource;
use crate::error::SourceError;
use crate::model::{ClashElement, ClashRecord, Location, Severity, Status};

pub const DEFAULT_BASE_URL: &str = "https://developer.api.autodesk.com";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const UNKNOWN_DISCIPLINE: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct ApsSettings {
    pub base_url: String,
    pub project_id: String,
    pub modelset_id: String,
    pub access_token: String,
    /// Container for problems; the project id is used when unset.
    pub coordination_space_id: Option<String>,
}

/// Vendor-backed clash source.
pub struct ApsSource {
    http: reqwest::Client,
    settings: ApsSettings,
}

impl ApsSource {
    #[must_use]
    pub fn new(settings: ApsSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        debug!(url, "GET");
        let request = self
            .http
            .get(url)
            .bearer_auth(&self.settings.access_token);
        let response = send_checked(request, url).await?;

        response.json().await.map_err(|e| SourceError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Downloads a signed resource URL; no bearer token is sent.
    async fn download_resource<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        debug!(url, "downloading resource");
        let response = send_checked(self.http.get(url), url).await?;

        let bytes = response.bytes().await.map_err(|source| SourceError::Http {
            url: url.to_string(),
            source,
        })?;
        decode_resource(&bytes).map_err(|message| SourceError::Decode {
            url: url.to_string(),
            message,
        })
    }

    async fn latest_version(&self) -> Result<ModelSetVersion, SourceError> {
        let s = &self.settings;
        let url = format!(
            "{}/bim360/modelset/v3/containers/{}/modelsets/{}/versions/latest",
            s.base_url, s.project_id, s.modelset_id
        );
        self.get_json(&url).await
    }

    async fn clash_tests(&self, version: i64) -> Result<Vec<ClashTest>, SourceError> {
        let s = &self.settings;
        let url = format!(
            "{}/bim360/clash/v3/containers/{}/modelsets/{}/versions/{version}/tests",
            s.base_url, s.project_id, s.modelset_id
        );
        let list: ClashTestList = self.get_json(&url).await?;
        Ok(list.tests)
    }

    async fn test_resources(&self, test_id: &str) -> Result<Vec<TestResource>, SourceError> {
        let s = &self.settings;
        let url = format!(
            "{}/bim360/clash/v3/containers/{}/tests/{test_id}/resources",
            s.base_url, s.project_id
        );
        let list: TestResourceList = self.get_json(&url).await?;
        Ok(list.resources)
    }

    async fn fetch_test(&self, test_id: &str) -> Result<Vec<ClashRecord>, SourceError> {
        let resources = self.test_resources(test_id).await?;
        let picked = ResourceSet::pick(&resources).ok_or_else(|| SourceError::NotReady {
            message: format!("test {test_id} is missing clash, instance or document resources"),
        })?;

        let clashes: ClashResource = self.download_resource(&picked.clash.url).await?;
        let instances: InstanceResource = self.download_resource(&picked.instance.url).await?;
        let documents: DocumentResource = self.download_resource(&picked.document.url).await?;

        Ok(map_clash_data(
            &clashes,
            &instances,
            &documents,
            &self.settings.project_id,
            Utc::now(),
        ))
    }
}

#[async_trait]
impl ClashSource for ApsSource {
    fn name(&self) -> &'static str {
        "aps"
    }

    async fn fetch(&self) -> Result<Vec<ClashRecord>, SourceError> {
        info!(
            project = %self.settings.project_id,
            modelset = %self.settings.modelset_id,
            "fetching clashes from Model Coordination"
        );

        let version = self.latest_version().await?;
        if version.status != "Successful" {
            return Err(SourceError::NotReady {
                message: format!(
                    "model set version {} has status '{}'",
                    version.version, version.status
                ),
            });
        }

        let tests = self.clash_tests(version.version).await?;
        info!(version = version.version, tests = tests.len(), "clash tests found");

        let mut all = Vec::new();
        for test in tests {
            if test.status != "Success" {
                warn!(test = %test.id, status = %test.status, "skipping clash test");
                continue;
            }
            match self.fetch_test(&test.id).await {
                Ok(records) => {
                    info!(test = %test.id, count = records.len(), "mapped clash test");
                    all.extend(records);
                }
                Err(e) => warn!(test = %test.id, error = %e, "failed to read clash test"),
            }
        }

        info!(count = all.len(), "fetched clashes from Model Coordination");
        Ok(all)
    }
}

#[derive(Debug, Deserialize)]
struct ModelSetVersion {
    version: i64,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClashTestList {
    tests: Vec<ClashTest>,
}

#[derive(Debug, Deserialize)]
struct ClashTest {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TestResourceList {
    resources: Vec<TestResource>,
}

#[derive(Debug, Clone, Deserialize)]
struct TestResource {
    #[serde(rename = "type", default)]
    kind: String,
    url: String,
}

struct ResourceSet<'a> {
    clash: &'a TestResource,
    instance: &'a TestResource,
    document: &'a TestResource,
}

impl<'a> ResourceSet<'a> {
    fn pick(resources: &'a [TestResource]) -> Option<Self> {
        let mut clash = None;
        let mut instance = None;
        let mut document = None;
        for resource in resources {
            let kind = resource.kind.as_str();
            if kind.contains("scope-version-clash-instance.") {
                instance = Some(resource);
            } else if kind.contains("scope-version-clash.") {
                clash = Some(resource);
            } else if kind.contains("scope-version-document.") {
                document = Some(resource);
            }
        }
        Some(Self {
            clash: clash?,
            instance: instance?,
            document: document?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ClashResource {
    clashes: Vec<RawClash>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClash {
    id: Value,
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    distance: f64,
    location: Option<RawLocation>,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
    #[serde(rename = "updatedAt")]
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLocation {
    x: f64,
    y: f64,
    z: f64,
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InstanceResource {
    instances: Vec<RawInstance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInstance {
    cid: Value,
    ldid: Value,
    rdid: Value,
    loid: Value,
    roid: Value,
    lvid: Value,
    rvid: Value,
    name: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DocumentResource {
    documents: Vec<RawDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDocument {
    id: Value,
    urn: String,
    discipline: Option<String>,
}

/// Sends `request` and turns transport failures and non-2xx answers into errors.
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<reqwest::Response, SourceError> {
    let response = request.send().await.map_err(|source| SourceError::Http {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

/// Parses a resource body that may be gzip-compressed and may carry a UTF-8 BOM.
pub(crate) fn decode_resource<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    let text = if bytes.starts_with(&GZIP_MAGIC) {
        let mut out = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut out)
            .map_err(|e| format!("gzip: {e}"))?;
        out
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|e| format!("utf-8: {e}"))?
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    serde_json::from_str(text).map_err(|e| format!("json: {e}"))
}

/// Joins the three clash-test resources into records.
///
/// Clashes with fewer than two instances are skipped. Severity follows the
/// clash distance: under 1 cm high, under 5 cm medium, otherwise low.
pub(crate) fn map_clash_data(
    clashes: &ClashResource,
    instances: &InstanceResource,
    documents: &DocumentResource,
    project_id: &str,
    now: DateTime<Utc>,
) -> Vec<ClashRecord> {
    let documents: HashMap<String, &RawDocument> = documents
        .documents
        .iter()
        .filter_map(|d| Some((value_key(&d.id)?, d)))
        .collect();

    let mut by_clash: HashMap<String, Vec<&RawInstance>> = HashMap::new();
    for instance in &instances.instances {
        if let Some(cid) = value_key(&instance.cid) {
            by_clash.entry(cid).or_default().push(instance);
        }
    }

    let mut records = Vec::new();
    for clash in &clashes.clashes {
        let Some(id) = value_key(&clash.id) else {
            continue;
        };
        let pair = by_clash.get(&id).map(Vec::as_slice).unwrap_or_default();
        let (left, right) = match pair {
            [left, right, ..] => (*left, *right),
            _ => {
                warn!(clash = %id, "clash has fewer than two instances, skipping");
                continue;
            }
        };

        let left_doc = value_key(&left.ldid).and_then(|k| documents.get(&k).copied());
        let right_doc = value_key(&right.rdid).and_then(|k| documents.get(&k).copied());

        let element_a = element(left, left_doc, &left.loid, &left.lvid);
        let element_b = element(right, right_doc, &right.roid, &right.rvid);

        let mut disciplines: Vec<String> = [left_doc, right_doc]
            .iter()
            .filter_map(|d| d.and_then(|d| d.discipline.clone()))
            .filter(|d| !d.is_empty())
            .collect();
        if disciplines.is_empty() {
            disciplines.push(UNKNOWN_DISCIPLINE.to_string());
        }

        let location = clash.location.as_ref();
        records.push(ClashRecord {
            group_id: clash
                .group_id
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            title: format!("Clash {id}"),
            severity: severity_for_distance(clash.distance),
            status: Status::Open,
            disciplines,
            level: location.and_then(|l| l.level.clone()),
            elements: vec![element_a, element_b],
            location: location.map_or_else(Location::default, |l| Location {
                x: l.x,
                y: l.y,
                z: l.z,
            }),
            created_at: parse_time(clash.created_at.as_deref()).unwrap_or(now),
            updated_at: parse_time(clash.updated_at.as_deref()).unwrap_or(now),
            deep_link: Some(format!(
                "https://acc.autodesk.com/projects/{project_id}/clashes/{id}"
            )),
            screenshot_url: None,
            id,
        });
    }
    records
}

fn element(
    instance: &RawInstance,
    document: Option<&RawDocument>,
    object_id: &Value,
    viewable_id: &Value,
) -> ClashElement {
    ClashElement {
        urn: document.map(|d| d.urn.clone()).unwrap_or_default(),
        guid: value_key(object_id).unwrap_or_default(),
        name: instance.name.clone().unwrap_or_else(|| {
            format!("Object {}", value_key(viewable_id).unwrap_or_default())
        }),
        category: instance.category.clone().unwrap_or_default(),
    }
}

fn severity_for_distance(distance: f64) -> Severity {
    if distance < 0.01 {
        Severity::High
    } else if distance < 0.05 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub(crate) fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Ids arrive as numbers or strings.
pub(crate) fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    fn fixtures() -> (ClashResource, InstanceResource, DocumentResource) {
        let clashes = json!({
            "clashes": [
                {"id": 1, "groupId": "g1", "distance": 0.002,
                 "location": {"x": 1.0, "y": 2.0, "z": 3.0, "level": "L02"},
                 "createdAt": "2024-05-01T10:00:00Z"},
                {"id": 2, "distance": 0.03},
                {"id": 3, "distance": 0.2},
                {"id": 4, "distance": 0.0}
            ]
        });
        let instances = json!({
            "instances": [
                {"cid": 1, "ldid": 10, "loid": 111, "lvid": 5, "name": "Duct-1", "category": "Ducts"},
                {"cid": 1, "rdid": 20, "roid": 222, "rvid": 6, "category": "Beams"},
                {"cid": 2, "ldid": 10, "loid": 1},
                {"cid": 2, "rdid": 99, "roid": 2},
                {"cid": 3, "ldid": 20, "loid": 3},
                {"cid": 3, "rdid": 20, "roid": 4},
                {"cid": 4, "ldid": 10, "loid": 5}
            ]
        });
        let documents = json!({
            "documents": [
                {"id": 10, "urn": "urn:mep", "discipline": "MEP"},
                {"id": 20, "urn": "urn:str", "discipline": "Structure"}
            ]
        });
        (
            serde_json::from_value(clashes).unwrap(),
            serde_json::from_value(instances).unwrap(),
            serde_json::from_value(documents).unwrap(),
        )
    }

    #[test]
    fn maps_resources_into_records() {
        let (c, i, d) = fixtures();
        let now = Utc::now();
        let records = map_clash_data(&c, &i, &d, "proj-1", now);

        // clash 4 has a single instance
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.id, "1");
        assert_eq!(first.group_id, "g1");
        assert_eq!(first.severity, Severity::High);
        assert_eq!(first.status, Status::Open);
        assert_eq!(first.disciplines, vec!["MEP", "Structure"]);
        assert_eq!(first.level.as_deref(), Some("L02"));
        assert_eq!(first.elements[0].name, "Duct-1");
        assert_eq!(first.elements[0].urn, "urn:mep");
        assert_eq!(first.elements[1].name, "Object 6");
        assert_eq!(first.categories().collect::<Vec<_>>(), vec!["Ducts", "Beams"]);
        assert_eq!(
            first.deep_link.as_deref(),
            Some("https://acc.autodesk.com/projects/proj-1/clashes/1")
        );
        assert_eq!(first.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(first.updated_at, now);
    }

    #[test]
    fn severity_follows_distance_and_missing_documents_degrade() {
        let (c, i, d) = fixtures();
        let records = map_clash_data(&c, &i, &d, "p", Utc::now());

        assert_eq!(records[1].severity, Severity::Medium);
        assert_eq!(records[1].disciplines, vec!["MEP"]);
        assert_eq!(records[2].severity, Severity::Low);
        assert_eq!(records[2].disciplines, vec!["Structure", "Structure"]);
    }

    #[test]
    fn decodes_plain_bom_and_gzip_payloads() {
        let body = br#"{"documents": [{"id": "a", "urn": "u"}]}"#;

        let plain: DocumentResource = decode_resource(body).unwrap();
        assert_eq!(plain.documents.len(), 1);

        let mut with_bom = "\u{feff}".as_bytes().to_vec();
        with_bom.extend_from_slice(body);
        let bom: DocumentResource = decode_resource(&with_bom).unwrap();
        assert_eq!(bom.documents.len(), 1);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body).unwrap();
        let gz: DocumentResource = decode_resource(&encoder.finish().unwrap()).unwrap();
        assert_eq!(gz.documents[0].urn, "u");
    }

    #[test]
    fn picks_the_three_resource_kinds() {
        let resources = vec![
            TestResource {
                kind: "scope-version-document.1.2.3.json.gz".to_string(),
                url: "d".to_string(),
            },
            TestResource {
                kind: "scope-version-clash-instance.1.2.3.json.gz".to_string(),
                url: "i".to_string(),
            },
            TestResource {
                kind: "scope-version-clash.1.2.3.json.gz".to_string(),
                url: "c".to_string(),
            },
        ];
        let set = ResourceSet::pick(&resources).unwrap();
        assert_eq!(set.clash.url, "c");
        assert_eq!(set.instance.url, "i");
        assert_eq!(set.document.url, "d");
        assert!(ResourceSet::pick(&resources[..2]).is_none());
    }
}
