use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;

/// One feed record. Only these five fields are consumed; anything else in the
/// JSON is ignored. Accessors trim, and absent fields read as empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Article {
    #[serde(default)]
    article_image: Option<String>,
    #[serde(default)]
    article_title: Option<String>,
    #[serde(default)]
    published_date_bn: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    category_bn: Option<String>,
}

impl Article {
    pub fn image(&self) -> &str {
        trimmed(&self.article_image)
    }

    pub fn title(&self) -> &str {
        trimmed(&self.article_title)
    }

    pub fn date(&self) -> &str {
        trimmed(&self.published_date_bn)
    }

    pub fn source(&self) -> &str {
        trimmed(&self.source)
    }

    pub fn category(&self) -> &str {
        trimmed(&self.category_bn)
    }
}

fn trimmed(field: &Option<String>) -> &str {
    field.as_deref().map(str::trim).unwrap_or("")
}

pub fn read_feed(path: &Path) -> Result<Vec<Article>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read feed: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse feed JSON: {}", path.display()))?;
    articles_from_value(value)
}

/// Normalize the three accepted feed shapes into one ordered sequence: a bare
/// array, `{"articles": [...]}`, or a single object treated as one record.
pub fn articles_from_value(value: Value) -> Result<Vec<Article>> {
    match value {
        Value::Array(items) => Ok(collect_articles(items)),
        Value::Object(mut map) => match map.remove("articles") {
            Some(Value::Array(items)) => Ok(collect_articles(items)),
            Some(_) => Err(anyhow!("feed field 'articles' is not an array")),
            None => {
                let article = serde_json::from_value(Value::Object(map))
                    .with_context(|| "failed to parse feed record")?;
                Ok(vec![article])
            }
        },
        _ => Err(anyhow!("unexpected feed JSON shape (expected an array or an object)")),
    }
}

fn collect_articles(items: Vec<Value>) -> Vec<Article> {
    let mut articles = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            warn!("dropping non-object feed entry at index {}", index);
            continue;
        }
        match serde_json::from_value::<Article>(item) {
            Ok(article) => articles.push(article),
            Err(err) => warn!("dropping malformed feed entry at index {}: {}", index, err),
        }
    }
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(title: &str) -> Value {
        json!({
            "article_image": "https://example.test/a.jpg",
            "article_title": title,
            "published_date_bn": "১২ আগস্ট ২০২৫",
            "source": "প্রথম আলো",
            "category_bn": "জাতীয়",
            "url": "https://example.test/article",
        })
    }

    #[test]
    fn all_three_shapes_yield_the_same_sequence() {
        let records = vec![record("one"), record("two")];
        let from_array = articles_from_value(json!(records.clone())).unwrap();
        let from_object = articles_from_value(json!({ "articles": records })).unwrap();
        let titles = |articles: &[Article]| {
            articles
                .iter()
                .map(|article| article.title().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(titles(&from_array), vec!["one", "two"]);
        assert_eq!(titles(&from_array), titles(&from_object));

        let single = articles_from_value(record("one")).unwrap();
        assert_eq!(titles(&single), vec!["one"]);
    }

    #[test]
    fn accessors_trim_and_default_to_empty() {
        let article: Article =
            serde_json::from_value(json!({ "article_title": "  hello  " })).unwrap();
        assert_eq!(article.title(), "hello");
        assert_eq!(article.image(), "");
        assert_eq!(article.category(), "");
    }

    #[test]
    fn non_object_entries_are_dropped() {
        let articles =
            articles_from_value(json!([record("kept"), 42, "noise", record("also kept")]))
                .unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title(), "kept");
        assert_eq!(articles[1].title(), "also kept");
    }

    #[test]
    fn scalar_roots_are_rejected() {
        assert!(articles_from_value(json!(42)).is_err());
        assert!(articles_from_value(json!("feed")).is_err());
    }
}
