//! Payload schemas of the public routes.

use crate::validation::{FieldSpec, FieldType, Schema};

const FARM_TYPES: &[&str] = &["crop", "livestock", "mixed", "orchard", "greenhouse"];
const AREA_UNITS: &[&str] = &["acres", "hectares"];
const CROP_STATUSES: &[&str] = &["planned", "planted", "growing", "harvested", "failed"];
const POST_CATEGORIES: &[&str] = &["general", "question", "tip", "market", "weather"];
const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Highest page number a list query may ask for.
pub const MAX_PAGE: f64 = 10_000.0;

/// Largest accepted image upload, in bytes.
pub const MAX_UPLOAD_BYTES: f64 = 5.0 * 1024.0 * 1024.0;

pub fn login() -> Schema {
    Schema::new(vec![
        FieldSpec::email("email").required(),
        FieldSpec::string("password").required().len(1, 128),
    ])
}

pub fn forgot_password() -> Schema {
    Schema::new(vec![FieldSpec::email("email").required()])
}

/// Paging shared by list endpoints.
pub fn page_query() -> Schema {
    Schema::new(vec![
        FieldSpec::integer("page").range(1.0, MAX_PAGE).default_value(1),
        FieldSpec::integer("limit").range(1.0, 100.0).default_value(20),
        FieldSpec::boolean("mine").default_value(false),
    ])
}

pub fn post_query() -> Schema {
    Schema::new(vec![
        FieldSpec::integer("page").range(1.0, MAX_PAGE).default_value(1),
        FieldSpec::integer("limit").range(1.0, 100.0).default_value(20),
        FieldSpec::one_of("category", POST_CATEGORIES),
    ])
}

pub fn farm_create() -> Schema {
    Schema::new(vec![
        FieldSpec::string("name").required().len(2, 100),
        FieldSpec::number("area").required().min(0.0),
        FieldSpec::one_of("unit", AREA_UNITS).default_value("acres"),
        FieldSpec::one_of("farmType", FARM_TYPES).default_value("crop"),
        FieldSpec::string("location").max_len(200),
        FieldSpec::string("description").max_len(1000),
    ])
}

pub fn farm_update() -> Schema {
    Schema::new(vec![
        FieldSpec::string("name").len(2, 100),
        FieldSpec::number("area").min(0.0),
        FieldSpec::one_of("unit", AREA_UNITS),
        FieldSpec::one_of("farmType", FARM_TYPES),
        FieldSpec::string("location").max_len(200),
        FieldSpec::string("description").max_len(1000),
    ])
}

pub fn crop_create() -> Schema {
    Schema::new(vec![
        FieldSpec::object_id("farm").required(),
        FieldSpec::string("name").required().len(2, 100),
        FieldSpec::string("variety").max_len(100),
        FieldSpec::number("area").min(0.0),
        FieldSpec::one_of("status", CROP_STATUSES).default_value("planned"),
        FieldSpec::string("plantedAt"),
        FieldSpec::string("expectedHarvest"),
    ])
}

pub fn crop_update() -> Schema {
    Schema::new(vec![
        FieldSpec::string("name").len(2, 100),
        FieldSpec::string("variety").max_len(100),
        FieldSpec::number("area").min(0.0),
        FieldSpec::one_of("status", CROP_STATUSES),
        FieldSpec::string("plantedAt"),
        FieldSpec::string("expectedHarvest"),
    ])
}

pub fn post_create() -> Schema {
    Schema::new(vec![
        FieldSpec::string("title").required().len(3, 200),
        FieldSpec::string("content").required().len(1, 5000),
        FieldSpec::one_of("category", POST_CATEGORIES).default_value("general"),
        FieldSpec::array("tags", FieldType::String).max_len(10),
    ])
}

pub fn post_update() -> Schema {
    Schema::new(vec![
        FieldSpec::string("title").len(3, 200),
        FieldSpec::string("content").len(1, 5000),
        FieldSpec::one_of("category", POST_CATEGORIES),
        FieldSpec::array("tags", FieldType::String).max_len(10),
    ])
}

pub fn upload() -> Schema {
    Schema::new(vec![
        FieldSpec::string("filename").required().len(1, 255),
        FieldSpec::one_of("contentType", IMAGE_TYPES).required(),
        FieldSpec::integer("size").required().range(1.0, MAX_UPLOAD_BYTES),
        FieldSpec::object_id("farm"),
    ])
}
