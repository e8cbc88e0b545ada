/// Source and dataset name constants to keep file layout, config and HTTP names aligned

// Source names (config keys, `source` column values, dataset names)
pub const GOOGLE_SOURCE: &str = "google";
pub const WEBSITE_SOURCE: &str = "website";
pub const FACEBOOK_SOURCE: &str = "facebook";

// Output dataset name and its legacy alias
pub const MERGED_DATASET: &str = "merged";
pub const COMBINED_DATASET_ALIAS: &str = "combined";

// Default file names inside the data directory
pub const GOOGLE_FILE: &str = "google_dataset.csv";
pub const WEBSITE_FILE: &str = "website_dataset.csv";
pub const WEBSITE_ENRICHED_FILE: &str = "website_dataset_with_address.csv";
pub const FACEBOOK_FILE: &str = "facebook_dataset.csv";
pub const MERGED_FILE: &str = "merged_dataset.csv";

// Canonical column names
pub const NAME_COLUMN: &str = "name";
pub const LEGAL_NAME_COLUMN: &str = "legal_name";
pub const PHONE_COLUMN: &str = "phone";
pub const CATEGORY_COLUMN: &str = "category";
pub const SOURCE_COLUMN: &str = "source";
pub const ADDRESS_COLUMN: &str = "address";

// Website locality sub-fields combined by the address enricher
pub const WEBSITE_CITY_COLUMN: &str = "main_city";
pub const WEBSITE_REGION_COLUMN: &str = "main_region";
pub const WEBSITE_COUNTRY_COLUMN: &str = "main_country";

pub const ADDRESS_SEPARATOR: &str = ", ";

/// Map a dataset name from the HTTP surface onto the canonical dataset name
pub fn dataset_to_canonical(dataset: &str) -> Option<&'static str> {
    match dataset {
        GOOGLE_SOURCE => Some(GOOGLE_SOURCE),
        WEBSITE_SOURCE => Some(WEBSITE_SOURCE),
        FACEBOOK_SOURCE => Some(FACEBOOK_SOURCE),
        MERGED_DATASET | COMBINED_DATASET_ALIAS => Some(MERGED_DATASET),
        _ => None,
    }
}

/// Get all dataset names served over HTTP
pub fn get_supported_datasets() -> Vec<&'static str> {
    vec![GOOGLE_SOURCE, WEBSITE_SOURCE, FACEBOOK_SOURCE, MERGED_DATASET]
}
