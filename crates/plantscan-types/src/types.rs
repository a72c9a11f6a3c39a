//! Core types for plant assessment

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::str::FromStr;

/// Species value used when the model reply could not be parsed
pub const SPECIES_PARSING_ERROR: &str = "Parsing error";

/// Species value used when the provider call itself failed
pub const SPECIES_API_ERROR: &str = "API Error";

/// Species value used when the plant filter rejected the image
pub const SPECIES_NOT_A_PLANT: &str = "Not a Plant";

/// Native region value used when nothing better is known
pub const UNKNOWN_REGION: &str = "Unknown";

/// Deserialize null as default value
fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::deserialize(deserializer).map(|opt| opt.unwrap_or_default())
}

fn default_native_region() -> String {
    UNKNOWN_REGION.to_string()
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// A native plant suggested in place of the identified one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeAlternative {
    #[serde(default, deserialize_with = "null_to_default")]
    pub common_name: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub scientific_name: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub characteristics: String,
}

/// Structured invasiveness assessment for one photograph.
///
/// Always fully populated. Failures are expressed through the sentinel
/// species values and explained in `invasive_effects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantAssessment {
    /// Identified species, `None` when the model could not name one
    #[serde(rename = "specieIdentified", alias = "speciesIdentified", default)]
    pub species_identified: Option<String>,

    /// Region the species is native to
    #[serde(default = "default_native_region", deserialize_with = "native_region_or_unknown")]
    pub native_region: String,

    /// Whether the species is invasive in the requested region
    #[serde(default, deserialize_with = "null_to_default")]
    pub invasive_or_not: bool,

    /// Identification confidence in [0, 100] (rich prompt variant only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    /// Why the model chose that confidence (rich prompt variant only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_reasoning: Option<String>,

    #[serde(default, deserialize_with = "null_to_default")]
    pub invasive_effects: String,

    #[serde(default, deserialize_with = "null_to_default")]
    pub native_alternatives: Vec<NativeAlternative>,

    #[serde(default, deserialize_with = "null_to_default")]
    pub remove_instructions: String,
}

fn native_region_or_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|opt| opt.unwrap_or_else(default_native_region))
}

impl Default for PlantAssessment {
    fn default() -> Self {
        Self {
            species_identified: None,
            native_region: default_native_region(),
            invasive_or_not: false,
            confidence_score: None,
            confidence_reasoning: None,
            invasive_effects: String::new(),
            native_alternatives: Vec::new(),
            remove_instructions: String::new(),
        }
    }
}

impl PlantAssessment {
    /// Fallback record for a reply no extraction strategy could parse
    pub fn parsing_error(raw: &str, reason: &str) -> Self {
        Self {
            species_identified: Some(SPECIES_PARSING_ERROR.to_string()),
            invasive_effects: format!(
                "Could not parse the model response ({}). Raw response: {}",
                reason,
                excerpt(raw.trim(), 200)
            ),
            remove_instructions: "Try the analysis again, ideally with a clearer photo.".to_string(),
            ..Default::default()
        }
    }

    /// Record for a failed provider call
    pub fn api_error(detail: &str) -> Self {
        Self {
            species_identified: Some(SPECIES_API_ERROR.to_string()),
            invasive_effects: format!(
                "Unable to analyze the image: the model provider returned an error. {}",
                excerpt(detail.trim(), 200)
            ),
            remove_instructions: "Please try again later.".to_string(),
            ..Default::default()
        }
    }

    /// Record returned when the plant filter says the photo is not a plant
    pub fn not_a_plant() -> Self {
        Self {
            species_identified: Some(SPECIES_NOT_A_PLANT.to_string()),
            native_region: "N/A".to_string(),
            invasive_or_not: false,
            confidence_score: None,
            confidence_reasoning: Some(
                "The plant filter determined this image does not contain a plant.".to_string(),
            ),
            invasive_effects: "N/A".to_string(),
            native_alternatives: Vec::new(),
            remove_instructions: "Please upload a photo of a plant.".to_string(),
        }
    }

    /// True for the parsing and provider failure sentinels
    pub fn is_failure(&self) -> bool {
        matches!(
            self.species_identified.as_deref(),
            Some(SPECIES_PARSING_ERROR) | Some(SPECIES_API_ERROR)
        )
    }

    pub fn is_not_a_plant(&self) -> bool {
        self.species_identified.as_deref() == Some(SPECIES_NOT_A_PLANT)
    }
}

/// Meteorological season label embedded in the analysis prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum Season {
    Spring,
    Summer,
    #[value(alias = "autumn")]
    #[serde(alias = "Autumn")]
    Fall,
    Winter,
}

impl Season {
    /// Season for a date (northern hemisphere, meteorological boundaries)
    pub fn from_date(date: NaiveDate) -> Self {
        match date.month() {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
            Season::Winter => "Winter",
        }
    }
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "fall" | "autumn" => Ok(Season::Fall),
            "winter" => Ok(Season::Winter),
            other => Err(format!("unknown season '{}'", other)),
        }
    }
}

/// Who is asking, used to tailor chat answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum UserRole {
    Student,
    Homeowner,
    #[value(name = "land-manager")]
    #[serde(alias = "Land Manager", alias = "land-manager")]
    LandManager,
    #[default]
    General,
}

impl UserRole {
    pub fn label(&self) -> &'static str {
        match self {
            UserRole::Student => "Student",
            UserRole::Homeowner => "Homeowner",
            UserRole::LandManager => "Land Manager",
            UserRole::General => "General",
        }
    }
}

/// What the chat assistant already knows about the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    /// Species identified by a previous analysis
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub is_invasive: Option<bool>,
    #[serde(default)]
    pub role: UserRole,
}

impl ChatContext {
    pub fn with_species(mut self, species: impl Into<String>) -> Self {
        self.species = Some(species.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_invasive(mut self, invasive: bool) -> Self {
        self.is_invasive = Some(invasive);
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }
}

fn strip_whitespace(text: &str) -> Cow<'_, str> {
    if text.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(text.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(text)
    }
}

/// Image bytes as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Undecoded file contents
    Raw(Vec<u8>),
    /// Standard base64 text, without any `data:` prefix
    Base64(String),
}

impl ImagePayload {
    /// Parse base64 text or a `data:image/...;base64,` URL.
    ///
    /// Returns the payload plus the MIME type carried by a data URL.
    pub fn from_encoded(text: &str) -> (Self, Option<String>) {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix("data:") {
            if let Some((header, data)) = rest.split_once(',') {
                let mime = header
                    .split(';')
                    .next()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string);
                return (ImagePayload::Base64(data.trim().to_string()), mime);
            }
        }
        (ImagePayload::Base64(text.to_string()), None)
    }

    /// Base64 text for the wire, with any line wrapping removed
    pub fn to_base64(&self) -> String {
        match self {
            ImagePayload::Raw(bytes) => BASE64.encode(bytes),
            ImagePayload::Base64(text) => strip_whitespace(text).into_owned(),
        }
    }

    /// Raw bytes, decoding base64 when needed. `None` if the text is not valid base64.
    ///
    /// Whitespace inside the text (76-column MIME wrapping, newlines in a
    /// data URL) is ignored.
    pub fn bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            ImagePayload::Raw(bytes) => Some(Cow::Borrowed(bytes.as_slice())),
            ImagePayload::Base64(text) => BASE64
                .decode(strip_whitespace(text).as_bytes())
                .ok()
                .map(Cow::Owned),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ImagePayload::Raw(bytes) => bytes.is_empty(),
            ImagePayload::Base64(text) => text.trim().is_empty(),
        }
    }
}

/// One analysis call: the photo plus its observation context
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image: ImagePayload,
    /// Declared MIME type, sniffed from the bytes when absent
    pub mime_type: Option<String>,
    /// Region to assess invasiveness against; the configured default applies when absent
    pub region: Option<String>,
    pub date: Option<NaiveDate>,
    /// Derived from `date` when absent
    pub season: Option<Season>,
}

impl AnalysisRequest {
    pub fn new(image: ImagePayload) -> Self {
        Self {
            image,
            mime_type: None,
            region: None,
            date: None,
            season: None,
        }
    }

    /// Build from base64 text or a data URL, keeping the data URL's MIME type
    pub fn from_encoded(text: &str) -> Self {
        let (image, mime_type) = ImagePayload::from_encoded(text);
        Self {
            mime_type,
            ..Self::new(image)
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_season(mut self, season: Season) -> Self {
        self.season = Some(season);
        self
    }

    /// Explicit season, else the season of the observation date
    pub fn effective_season(&self) -> Option<Season> {
        self.season.or_else(|| self.date.map(Season::from_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_from_date_boundaries() {
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        assert_eq!(Season::from_date(d(2, 29)), Season::Winter);
        assert_eq!(Season::from_date(d(3, 1)), Season::Spring);
        assert_eq!(Season::from_date(d(8, 31)), Season::Summer);
        assert_eq!(Season::from_date(d(11, 30)), Season::Fall);
        assert_eq!(Season::from_date(d(12, 1)), Season::Winter);
    }

    #[test]
    fn test_season_parse_accepts_autumn() {
        assert_eq!("Autumn".parse::<Season>().unwrap(), Season::Fall);
        assert_eq!(" spring ".parse::<Season>().unwrap(), Season::Spring);
        assert!("monsoon".parse::<Season>().is_err());
    }

    #[test]
    fn test_effective_season_prefers_explicit() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        let req = AnalysisRequest::new(ImagePayload::Raw(vec![1])).with_date(date);
        assert_eq!(req.effective_season(), Some(Season::Summer));

        let req = req.with_season(Season::Winter);
        assert_eq!(req.effective_season(), Some(Season::Winter));
    }

    #[test]
    fn test_data_url_payload() {
        let (payload, mime) = ImagePayload::from_encoded("data:image/png;base64,AAEC");
        assert_eq!(payload, ImagePayload::Base64("AAEC".to_string()));
        assert_eq!(mime.as_deref(), Some("image/png"));
        assert_eq!(payload.bytes().unwrap().as_ref(), &[0u8, 1, 2]);
    }

    #[test]
    fn test_wrapped_base64_payload() {
        let (payload, mime) = ImagePayload::from_encoded("data:image/jpeg;base64,/9j/4AAQ\r\nSkZJRg==");
        assert_eq!(mime.as_deref(), Some("image/jpeg"));
        assert_eq!(payload.to_base64(), "/9j/4AAQSkZJRg==");
        let bytes = payload.bytes().unwrap();
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(bytes.len(), 10);

        assert!(ImagePayload::Base64("not base64!".to_string()).bytes().is_none());
    }

    #[test]
    fn test_raw_payload_base64() {
        let payload = ImagePayload::Raw(vec![0, 1, 2]);
        assert_eq!(payload.to_base64(), "AAEC");
    }

    #[test]
    fn test_assessment_wire_names() {
        let assessment = PlantAssessment {
            species_identified: Some("Kudzu".to_string()),
            native_region: "East Asia".to_string(),
            invasive_or_not: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&assessment).unwrap();
        assert_eq!(json["specieIdentified"], "Kudzu");
        assert_eq!(json["invasiveOrNot"], true);
        assert_eq!(json["nativeAlternatives"], serde_json::json!([]));
        assert!(json.get("confidenceScore").is_none());
    }

    #[test]
    fn test_assessment_accepts_both_species_keys() {
        let a: PlantAssessment =
            serde_json::from_str(r#"{"speciesIdentified":"Oak","nativeRegion":null}"#).unwrap();
        assert_eq!(a.species_identified.as_deref(), Some("Oak"));
        assert_eq!(a.native_region, UNKNOWN_REGION);
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("abc", 5), "abc");
        assert_eq!(excerpt("abcdef", 3), "abc...");
    }

    #[test]
    fn test_sentinels() {
        assert!(PlantAssessment::parsing_error("x", "y").is_failure());
        assert!(PlantAssessment::api_error("HTTP Error: 500").is_failure());
        assert!(PlantAssessment::not_a_plant().is_not_a_plant());
        assert!(!PlantAssessment::not_a_plant().is_failure());
    }
}
