// 📐 Shape Layer - Request validation
// Validates raw request fields and turns them into typed submissions.
//
// Rules follow the public form contract: trim first, report only the first
// failure per field, and never guess at a value that did not validate.

use crate::entities::{BuildingFields, BuildingType, Style, Tile};
use crate::error::FieldError;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Largest accepted image upload, in bytes (before base64 encoding)
pub const MAX_IMAGE_BYTES: usize = 1_000_000;

/// Accepted image content types
pub const IMAGE_CONTENT_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/gif"];

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Fa-f0-9\-]{36}$").expect("valid id pattern"));

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[A-Za-z0-9 .,_"'()\-]{1,200}$"#).expect("valid name pattern"));

static OCCUPANCY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,4}$").expect("valid occupancy pattern"));

static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid time pattern"));

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid token pattern"));

// ============================================================================
// RAW INPUT SHAPES
// ============================================================================

/// Building attributes exactly as received (untrimmed)
#[derive(Debug, Clone, Default)]
pub struct RawFields {
    pub name: String,
    pub occupancy: String,
    pub building_type: String,
    pub tiles: Vec<String>,
    pub style: String,
}

/// Addition form exactly as received (multipart fields)
#[derive(Debug, Clone, Default)]
pub struct RawAddition {
    pub id: Option<String>,
    pub fields: RawFields,
    pub time: String,
    pub token: String,
}

/// Uploaded image as received
#[derive(Debug, Clone)]
pub struct RawImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Verified-request envelope shared by every mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// Client submission time, epoch milliseconds
    pub submitted_at_ms: i64,
    pub token: String,
}

/// Validated addition submission
#[derive(Debug, Clone, PartialEq)]
pub struct AdditionSubmission {
    /// Target record when editing a live building
    pub id: Option<String>,
    pub fields: BuildingFields,
    pub proof: Proof,
}

// ============================================================================
// VALIDATION RESULT
// ============================================================================

pub type ValidationResult<T> = Result<T, Vec<FieldError>>;

#[derive(Default)]
struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    fn push(&mut self, param: &str, msg: &str) {
        // first error per field only
        if !self.errors.iter().any(|e| e.param == param) {
            self.errors.push(FieldError::new(param, msg));
        }
    }

    fn finish<T>(self, value: Option<T>) -> ValidationResult<T> {
        match value {
            Some(v) if self.errors.is_empty() => Ok(v),
            _ => Err(self.errors),
        }
    }
}

// ============================================================================
// FIELD VALIDATORS
// ============================================================================

pub fn validate_id(raw: &str) -> Result<String, FieldError> {
    let id = raw.trim();
    if ID_PATTERN.is_match(id) {
        Ok(id.to_string())
    } else {
        Err(FieldError::new("id", "Invalid ID."))
    }
}

pub fn validate_name(raw: &str) -> Result<String, FieldError> {
    let name = raw.trim();
    if NAME_PATTERN.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(FieldError::new(
            "name",
            "Must be 1 to 200 characters. Can contain A-Z, a-z, 0-9, spaces, and .,_\"'()-.",
        ))
    }
}

pub fn validate_occupancy(raw: &str) -> Result<u16, FieldError> {
    let err = || FieldError::new("occupancy", "Must be a valid number.");
    let trimmed = raw.trim();
    if !OCCUPANCY_PATTERN.is_match(trimmed) {
        return Err(err());
    }
    match trimmed.parse::<u16>() {
        Ok(n) if (1..=9999).contains(&n) => Ok(n),
        _ => Err(err()),
    }
}

pub fn validate_time(raw: &str) -> Result<i64, FieldError> {
    let err = || FieldError::new("time", "Invalid value.");
    let trimmed = raw.trim();
    if !TIME_PATTERN.is_match(trimmed) {
        return Err(err());
    }
    trimmed.parse::<i64>().map_err(|_| err())
}

pub fn validate_token(raw: &str) -> Result<String, FieldError> {
    let token = raw.trim();
    if TOKEN_PATTERN.is_match(token) {
        Ok(token.to_string())
    } else {
        Err(FieldError::new("g-recaptcha-response", "Failed reCAPTCHA test."))
    }
}

/// Search text shares the name charset; blank means "no filter"
pub fn validate_search_text(raw: Option<&str>) -> Result<Option<String>, FieldError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) if NAME_PATTERN.is_match(text) => Ok(Some(text.to_string())),
        Some(_) => Err(FieldError::new("searchText", "Invalid search text.")),
    }
}

pub fn validate_image(image: &RawImage) -> Result<(), FieldError> {
    if image.bytes.len() > MAX_IMAGE_BYTES {
        return Err(FieldError::new("image", "Image file must be less than 1MB."));
    }
    if !IMAGE_CONTENT_TYPES.contains(&image.content_type.as_str()) {
        return Err(FieldError::new("image", "Please use a valid image."));
    }
    Ok(())
}

pub fn validate_proof(time: &str, token: &str) -> ValidationResult<Proof> {
    let mut errors = Collector::default();
    let submitted_at_ms = validate_time(time)
        .map_err(|e| errors.push(&e.param, &e.msg))
        .ok();
    let token = validate_token(token)
        .map_err(|e| errors.push(&e.param, &e.msg))
        .ok();

    let proof = submitted_at_ms
        .zip(token)
        .map(|(submitted_at_ms, token)| Proof { submitted_at_ms, token });
    errors.finish(proof)
}

fn collect_fields(raw: &RawFields, errors: &mut Collector) -> Option<BuildingFields> {
    let name = validate_name(&raw.name)
        .map_err(|e| errors.push(&e.param, &e.msg))
        .ok();
    let occupancy = validate_occupancy(&raw.occupancy)
        .map_err(|e| errors.push(&e.param, &e.msg))
        .ok();
    let building_type = raw
        .building_type
        .trim()
        .parse::<BuildingType>()
        .map_err(|_| errors.push("type", "Must be a valid type."))
        .ok();

    let mut tiles = BTreeSet::new();
    for tile in &raw.tiles {
        match tile.trim().parse::<Tile>() {
            Ok(t) => {
                tiles.insert(t);
            }
            Err(_) => errors.push("tiles", "Must be a valid type."),
        }
    }
    if raw.tiles.is_empty() {
        errors.push("tiles", "Must select at least one tile size.");
    }

    let style = raw
        .style
        .trim()
        .parse::<Style>()
        .map_err(|_| errors.push("style", "Must be a valid style."))
        .ok();

    Some(BuildingFields {
        name: name?,
        occupancy: occupancy?,
        building_type: building_type?,
        tiles,
        style: style?,
    })
}

/// Validate building attributes on their own (seed import)
pub fn validate_fields(raw: &RawFields) -> ValidationResult<BuildingFields> {
    let mut errors = Collector::default();
    let fields = collect_fields(raw, &mut errors);
    errors.finish(fields)
}

/// Validate the addition form. All fields are checked so the client sees
/// every broken field at once.
pub fn validate_addition(raw: &RawAddition) -> ValidationResult<AdditionSubmission> {
    let mut errors = Collector::default();

    let id = match raw.id.as_deref().map(str::trim) {
        None | Some("") => Some(None),
        Some(id) => validate_id(id)
            .map(Some)
            .map_err(|e| errors.push(&e.param, &e.msg))
            .ok(),
    };
    let fields = collect_fields(&raw.fields, &mut errors);
    let proof = match validate_proof(&raw.time, &raw.token) {
        Ok(proof) => Some(proof),
        Err(proof_errors) => {
            for e in proof_errors {
                errors.push(&e.param, &e.msg);
            }
            None
        }
    };

    let submission = match (id, fields, proof) {
        (Some(id), Some(fields), Some(proof)) => Some(AdditionSubmission { id, fields, proof }),
        _ => None,
    };
    errors.finish(submission)
}

// ============================================================================
// TESTS
// ============================================================================
