use std::fs::File;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::data::osm::OsmId;
use crate::errors::{Error, Result};
use crate::etl::draw_map::SvgStyle;
use crate::etl::fetch_osm::DEFAULT_OVERPASS_URL;

pub const DEFAULT_CONFIG_PATH: &str = "config/osm2svg.json";

const USAGE: &str = "Nothing to do with this configuration. Provide one of:\n\
    - `source` set to an OpenStreetMap element URL, and `xml_path` and/or `svg_path`\n\
    - `source` set to a local OSM XML file, and `svg_path`";

#[derive(Deserialize, Debug)]
pub struct UserConfig {
    /// OpenStreetMap element URL, or path to an OSM XML file.
    pub source: String,
    #[serde(default)]
    pub xml_path: Option<String>,
    #[serde(default)]
    pub svg_path: Option<String>,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub refresh: bool,
    #[serde(default = "default_overpass_url")]
    pub overpass_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub style: SvgStyle,
}

fn default_work_dir() -> String {
    "output".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_overpass_url() -> String {
    DEFAULT_OVERPASS_URL.to_string()
}

fn default_max_retries() -> u32 {
    3
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let file = File::open(path).map_err(|err| {
        Error::config(format!("Could not open config file {}: {}", path.display(), err))
    })?;
    Ok(serde_json::from_reader(file)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Node,
    Way,
    Relation,
}

impl ElementType {
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Node => "node",
            ElementType::Way => "way",
            ElementType::Relation => "relation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsmElement {
    pub element_type: ElementType,
    pub id: OsmId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputToken {
    OsmUrl(OsmElement),
    XmlFile(PathBuf),
    SvgFile(PathBuf),
}

pub struct InputClassifier {
    osm_url: Regex,
    xml_file: Regex,
    svg_file: Regex,
}

impl InputClassifier {
    pub fn new() -> Result<Self> {
        Ok(InputClassifier {
            osm_url: Regex::new(
                r"(?i)^https?://www\.openstreetmap\.org/(?<type>relation|node|way)/(?<id>[0-9]+)(#.*)?$",
            )?,
            xml_file: Regex::new(r"(?i)\.(xml|osm)(\.xz)?$")?,
            svg_file: Regex::new(r"(?i)\.svg$")?,
        })
    }

    pub fn classify(&self, token: &str) -> Option<InputToken> {
        if let Some(captures) = self.osm_url.captures(token) {
            let element_type = match captures.name("type")?.as_str().to_ascii_lowercase().as_str() {
                "relation" => ElementType::Relation,
                "way" => ElementType::Way,
                _ => ElementType::Node,
            };
            let id = captures.name("id")?.as_str().parse().ok()?;
            Some(InputToken::OsmUrl(OsmElement { element_type, id }))
        } else if self.xml_file.is_match(token) {
            Some(InputToken::XmlFile(PathBuf::from(token)))
        } else if self.svg_file.is_match(token) {
            Some(InputToken::SvgFile(PathBuf::from(token)))
        } else {
            None
        }
    }
}

/// What a run does, decided once from the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub download: Option<OsmElement>,
    pub xml_path: PathBuf,
    pub svg_path: Option<PathBuf>,
}

impl Job {
    pub fn resolve(config: &UserConfig) -> Result<Self> {
        let classifier = InputClassifier::new()?;

        let xml_path = match config.xml_path.as_deref().map(|path| classifier.classify(path)) {
            None => None,
            Some(Some(InputToken::XmlFile(path))) => Some(path),
            Some(_) => return Err(Error::config("`xml_path` must end in .xml or .osm")),
        };
        let svg_path = match config.svg_path.as_deref().map(|path| classifier.classify(path)) {
            None => None,
            Some(Some(InputToken::SvgFile(path))) => Some(path),
            Some(_) => return Err(Error::config("`svg_path` must end in .svg")),
        };

        match (classifier.classify(&config.source), xml_path, svg_path) {
            (Some(InputToken::OsmUrl(element)), Some(xml_path), svg_path) => Ok(Job {
                download: Some(element),
                xml_path,
                svg_path,
            }),
            (Some(InputToken::OsmUrl(element)), None, Some(svg_path)) => Ok(Job {
                download: Some(element),
                xml_path: Path::new(&config.work_dir)
                    .join(format!("{}-{}.osm", element.element_type.name(), element.id)),
                svg_path: Some(svg_path),
            }),
            (Some(InputToken::XmlFile(xml_path)), None, Some(svg_path)) => Ok(Job {
                download: None,
                xml_path,
                svg_path: Some(svg_path),
            }),
            (Some(InputToken::XmlFile(_)), Some(_), _) => {
                Err(Error::config("`xml_path` is only used when `source` is a URL"))
            },
            _ => Err(Error::config(USAGE)),
        }
    }

    /// Directory for intermediate results, one per input file.
    pub fn work_dir(&self, config: &UserConfig) -> Result<PathBuf> {
        let input_stem = self.xml_path
            .file_stem()
            .ok_or("Could not get input file name")?;
        Ok(Path::new(&config.work_dir).join(input_stem))
    }
}
