//! Depth-first traversal of the template category tree.
//!
//! Categories form a tree (children nested under
//! `category_children.template_category`); templates hang off individual
//! categories and are fetched lazily during the walk. The walker streams
//! tagged events to a caller-supplied sink in traversal order — the sink
//! typically buffers rows for a table and must not fail, there is no
//! error recovery for sinks.
//!
//! Ordering is whatever the remote API returns at each level; the walker
//! never sorts.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::client::ApiClient;
use crate::error::OktawaveError;
use crate::value::{dive_i64, dive_list};

/// Where the walker gets categories and templates from. Implemented by
/// [`ApiClient`]; tests substitute a canned tree.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait TemplateSource {
    async fn template_categories(&mut self) -> Result<Vec<Value>, OktawaveError>;
    async fn templates_by_category(
        &mut self,
        category_id: i64,
    ) -> Result<Vec<Value>, OktawaveError>;
}

impl TemplateSource for ApiClient {
    async fn template_categories(&mut self) -> Result<Vec<Value>, OktawaveError> {
        ApiClient::template_categories(self).await
    }

    async fn templates_by_category(
        &mut self,
        category_id: i64,
    ) -> Result<Vec<Value>, OktawaveError> {
        ApiClient::templates_by_category(self, category_id).await
    }
}

/// One traversal event. Depths are 0-based at the root categories;
/// everything emitted inside a category sits at `depth + 1`.
#[derive(Debug)]
pub enum TemplateEvent<'a> {
    CategoryEnter { category: &'a Value, depth: usize },
    Template { template: &'a Value, depth: usize },
    NoTemplates { depth: usize },
    NoSubcategories { depth: usize },
    CategoryExit { depth: usize },
}

/// Walk the whole tree, streaming events to `sink` synchronously and in
/// traversal order.
pub async fn walk<S, F>(source: &mut S, sink: &mut F) -> Result<(), OktawaveError>
where
    S: TemplateSource,
    F: FnMut(TemplateEvent<'_>),
{
    let roots = source.template_categories().await?;
    for category in roots {
        walk_category(source, sink, category, 0).await?;
    }
    Ok(())
}

// Recursive async requires a boxed future.
fn walk_category<'a, S, F>(
    source: &'a mut S,
    sink: &'a mut F,
    category: Value,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Result<(), OktawaveError>> + 'a>>
where
    S: TemplateSource,
    F: FnMut(TemplateEvent<'_>),
{
    Box::pin(async move {
        sink(TemplateEvent::CategoryEnter {
            category: &category,
            depth,
        });

        let category_id = dive_i64(&category, &["template_category_id"]).unwrap_or(0);
        let templates = source.templates_by_category(category_id).await?;
        if templates.is_empty() {
            sink(TemplateEvent::NoTemplates { depth: depth + 1 });
        } else {
            for template in &templates {
                sink(TemplateEvent::Template {
                    template,
                    depth: depth + 1,
                });
            }
        }

        let subcategories: Vec<Value> =
            dive_list(&category, &["category_children", "template_category"])
                .into_iter()
                .cloned()
                .collect();
        if subcategories.is_empty() {
            sink(TemplateEvent::NoSubcategories { depth: depth + 1 });
        } else {
            for sub in subcategories {
                walk_category(&mut *source, &mut *sink, sub, depth + 1).await?;
            }
        }

        sink(TemplateEvent::CategoryExit { depth });
        Ok(())
    })
}
