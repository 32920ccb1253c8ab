use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{info, warn};
use xz::write::XzEncoder;

use crate::config::{ElementType, OsmElement, UserConfig};
use crate::errors::Result;

use super::{is_xz_file, remove_if_exists, write_file, Etl};

pub const ETL_NAME: &str = "fetch_osm";
pub const DEFAULT_OVERPASS_URL: &str = "http://overpass-api.de/api/interpreter";
/// Names the element the downloaded file holds.
pub const ELEMENT_FILE_NAME: &str = "fetched_element";

const RETRY_PAUSE: Duration = Duration::from_secs(5);
const MAX_DOWNLOAD_BYTES: u64 = 1 << 30;
const XZ_PRESET: u32 = 6;

/// Downloads an element, together with everything it references, from the Overpass
/// API and stores the raw XML.
pub struct FetchOsmEtl<'a> {
    element: OsmElement,
    xml_path: PathBuf,
    config: &'a UserConfig,
    agent: ureq::Agent,
}

impl<'a> FetchOsmEtl<'a> {
    pub fn new(element: OsmElement, xml_path: &Path, config: &'a UserConfig) -> Self {
        FetchOsmEtl {
            element,
            xml_path: xml_path.to_path_buf(),
            config,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    /// `(type(id);>;);out;`, url-encoded.
    pub fn query_url(&self) -> String {
        let element_type = match self.element.element_type {
            ElementType::Relation => "rel",
            other => other.name(),
        };
        format!(
            "{}?data=%28{}%28{}%29%3B%3E%3B%29%3Bout%3B",
            self.config.overpass_url, element_type, self.element.id
        )
    }

    fn element_key(&self) -> String {
        format!("{}/{}", self.element.element_type.name(), self.element.id)
    }

    fn download(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.agent.get(url).call() {
                Ok(mut response) => {
                    return Ok(response.body_mut()
                        .with_config()
                        .limit(MAX_DOWNLOAD_BYTES)
                        .read_to_string()?);
                },
                Err(ureq::Error::StatusCode(429)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt = attempt; "Overpass API is rate limiting, retrying");
                    thread::sleep(RETRY_PAUSE);
                },
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Etl for FetchOsmEtl<'_> {
    type Input = String;
    type Output = String;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        let element_path = dir.join(ELEMENT_FILE_NAME);
        if !self.xml_path.try_exists()? || !element_path.try_exists()? {
            return Ok(false);
        }
        Ok(fs::read_to_string(element_path)?.trim() == self.element_key())
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        remove_if_exists(&self.xml_path)?;
        remove_if_exists(&dir.join(ELEMENT_FILE_NAME))
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        Ok(self.query_url())
    }

    fn transform(&mut self, url: Self::Input) -> Result<Self::Output> {
        info!(
            element_type = self.element.element_type.name(),
            element_id = self.element.id;
            "Downloading from OpenStreetMap"
        );
        self.download(&url)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let bytes = if is_xz_file(&self.xml_path) {
            let mut encoder = XzEncoder::new(Vec::new(), XZ_PRESET);
            encoder.write_all(output.as_bytes())?;
            encoder.finish()?
        } else {
            output.into_bytes()
        };
        write_file(&self.xml_path, &bytes)?;
        write_file(&dir.join(ELEMENT_FILE_NAME), self.element_key().as_bytes())?;
        let path = self.xml_path.display().to_string();
        info!(path = path.as_str(), bytes = bytes.len(); "Stored downloaded data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::etl::parse_osm::{read_cache, ParseOsmEtl};

    fn config() -> UserConfig {
        serde_json::from_str(r#"{"source": "https://www.openstreetmap.org/relation/1"}"#).unwrap()
    }

    #[rstest]
    #[case(ElementType::Relation, 62422, "http://overpass-api.de/api/interpreter?data=%28rel%2862422%29%3B%3E%3B%29%3Bout%3B")]
    #[case(ElementType::Way, 7, "http://overpass-api.de/api/interpreter?data=%28way%287%29%3B%3E%3B%29%3Bout%3B")]
    #[case(ElementType::Node, 3, "http://overpass-api.de/api/interpreter?data=%28node%283%29%3B%3E%3B%29%3Bout%3B")]
    fn builds_overpass_query(#[case] element_type: ElementType, #[case] id: i64, #[case] expected: &str) {
        let config = config();
        let etl = FetchOsmEtl::new(OsmElement { element_type, id }, Path::new("x.osm"), &config);

        assert_eq!(etl.query_url(), expected);
    }

    #[test]
    fn existing_download_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let xml_path = dir.path().join("relation-1.osm");
        let config = config();
        let element = OsmElement { element_type: ElementType::Relation, id: 1 };
        let mut etl = FetchOsmEtl::new(element, &xml_path, &config);
        etl.load(dir.path(), "<osm/>".to_string()).unwrap();

        assert!(etl.is_cached(dir.path()).unwrap());
        etl.process(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(&xml_path).unwrap(), "<osm/>");

        etl.clean(dir.path()).unwrap();
        assert!(!etl.is_cached(dir.path()).unwrap());
        assert!(!dir.path().join(ELEMENT_FILE_NAME).exists());
    }

    #[test]
    fn download_of_another_element_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let xml_path = dir.path().join("area.osm");
        let config = config();
        let first = OsmElement { element_type: ElementType::Relation, id: 62422 };
        FetchOsmEtl::new(first, &xml_path, &config)
            .load(dir.path(), "<osm/>".to_string())
            .unwrap();

        let second = OsmElement { element_type: ElementType::Relation, id: 1 };
        let same_type_other_id = FetchOsmEtl::new(second, &xml_path, &config);
        let third = OsmElement { element_type: ElementType::Way, id: 62422 };
        let other_type_same_id = FetchOsmEtl::new(third, &xml_path, &config);

        assert!(FetchOsmEtl::new(first, &xml_path, &config).is_cached(dir.path()).unwrap());
        assert!(!same_type_other_id.is_cached(dir.path()).unwrap());
        assert!(!other_type_same_id.is_cached(dir.path()).unwrap());
    }

    #[test]
    fn file_without_element_record_is_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let xml_path = dir.path().join("relation-1.osm");
        fs::write(&xml_path, "<osm/>").unwrap();
        let config = config();
        let element = OsmElement { element_type: ElementType::Relation, id: 1 };

        assert!(!FetchOsmEtl::new(element, &xml_path, &config).is_cached(dir.path()).unwrap());
    }

    #[test]
    fn download_into_xz_path_is_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let xml_path = dir.path().join("relation-9.osm.xz");
        let config = config();
        let element = OsmElement { element_type: ElementType::Relation, id: 9 };
        let osm = r#"<osm>
            <node id="1" lat="1.0" lon="1.0"/>
            <node id="2" lat="2.0" lon="2.0"/>
            <way id="5"><nd ref="1"/><nd ref="2"/></way>
            <relation id="9"><member type="way" ref="5" role=""/></relation>
        </osm>"#;

        FetchOsmEtl::new(element, &xml_path, &config)
            .load(dir.path(), osm.to_string())
            .unwrap();
        let work_dir = dir.path().join("work");
        ParseOsmEtl::new(&xml_path).process(&work_dir).unwrap();

        let data = read_cache(&work_dir).unwrap();
        assert_eq!(data.ways[&5].nodes, vec![1, 2]);
        assert_eq!(data.relations.len(), 1);
    }
}
