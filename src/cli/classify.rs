use std::path::PathBuf;

use anyhow::Result;

use crate::classification::{CategoryClassifier, Classification};

#[derive(Debug, Clone, Default)]
pub struct ClassifyConfig {
    pub taxonomy_path: Option<PathBuf>,
    pub title: String,
    pub url: String,
    pub brand: Option<String>,
    pub hint: Option<String>,
}

/// Classify a single product without touching storage.
pub fn explain(cfg: &ClassifyConfig) -> Result<Classification> {
    let taxonomy = super::load_taxonomy(cfg.taxonomy_path.as_deref())?;
    let classifier = CategoryClassifier::new(taxonomy);
    Ok(classifier.explain(
        &cfg.title,
        &cfg.url,
        cfg.hint.as_deref(),
        cfg.brand.as_deref(),
    ))
}

pub async fn run(cfg: ClassifyConfig) -> Result<()> {
    let decision = explain(&cfg)?;
    super::print_json(&decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::MatchStage;
    use crate::model::Category;

    #[test]
    fn explains_keyword_decision() {
        let decision = explain(&ClassifyConfig {
            title: "ASUS VivoBook 15 X1504".into(),
            url: "https://leaders.jo/en/product/vivobook-15/".into(),
            ..ClassifyConfig::default()
        })
        .unwrap();
        assert_eq!(decision.category, Category::ComputersLaptops);
        assert_eq!(decision.stage, MatchStage::Keyword);
    }

    #[test]
    fn missing_taxonomy_file_is_an_error() {
        let err = explain(&ClassifyConfig {
            taxonomy_path: Some(PathBuf::from("/nonexistent/taxonomy.json")),
            title: "anything".into(),
            ..ClassifyConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/taxonomy.json"));
    }
}
