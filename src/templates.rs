use crate::models::Template;

/// Categories offered for uploads and template filtering.
pub const PRESET_CATEGORIES: [&str; 6] = ["Funny", "Tech", "Animals", "Relatable", "Sports", "Other"];

/// Label for templates without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// The free-text category choice.
pub const OTHER_CATEGORY: &str = "Other";

pub fn category_label(template: &Template) -> &str {
    template.category.as_deref().unwrap_or(UNCATEGORIZED)
}

/// Keeps templates in `category`. An empty or missing filter keeps everything.
pub fn filter_by_category(templates: Vec<Template>, category: Option<&str>) -> Vec<Template> {
    match category.filter(|c| !c.is_empty()) {
        None => templates,
        Some(wanted) => templates
            .into_iter()
            .filter(|t| category_label(t) == wanted)
            .collect(),
    }
}

/// Template categories followed by the presets, de-duplicated in first-seen order.
pub fn category_options(templates: &[Template]) -> Vec<String> {
    let mut options: Vec<String> = Vec::new();
    let labels = templates
        .iter()
        .map(category_label)
        .chain(PRESET_CATEGORIES.iter().copied());
    for label in labels {
        if !options.iter().any(|o| o == label) {
            options.push(label.to_string());
        }
    }
    options
}

/// Resolves the category stored on an uploaded meme.
///
/// `Other` takes the custom text (or nothing when it is blank); an empty
/// selection means no category.
pub fn resolve_upload_category(selected: Option<&str>, custom: Option<&str>) -> Option<String> {
    match selected.filter(|s| !s.is_empty()) {
        None => None,
        Some(OTHER_CATEGORY) => custom.filter(|c| !c.is_empty()).map(str::to_string),
        Some(chosen) => Some(chosen.to_string()),
    }
}
