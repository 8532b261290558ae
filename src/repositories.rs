use crate::{
    domain::{MemeRepository, ReactionRepository, TemplateRepository},
    errors::RepoError,
    models::{Meme, MemeWithReactions, Reaction, ReactionKind, ReactionRef, Template, UserId},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{error::SdkError, types::AttributeValue, Client as DynamoDbClient};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{self, info};
use uuid::Uuid;

/// Reactions are keyed by (meme_id, reaction_id) so a viewer's row can be
/// found with a strongly consistent query on the base table.
pub const REACTION_HASH_KEY: &str = "meme_id";
pub const REACTION_RANGE_KEY: &str = "reaction_id";

type Item = HashMap<String, AttributeValue>;

/// Scans a whole table, following `LastEvaluatedKey` pages.
async fn scan_all(client: &DynamoDbClient, table_name: &str) -> Result<Vec<Item>, RepoError> {
    let mut items = Vec::new();
    let mut last_evaluated_key: Option<Item> = None;

    loop {
        let mut request_builder = client.scan().table_name(table_name).consistent_read(true);
        if let Some(lek) = last_evaluated_key {
            request_builder = request_builder.set_exclusive_start_key(Some(lek));
        }

        let resp = request_builder
            .send()
            .await
            .context(format!("DynamoDB: Failed to scan table '{}'", table_name))
            .map_err(RepoError::BackendError)?;

        if let Some(page) = resp.items {
            tracing::debug!("DynamoDB Scan (table: {}): Returned {} items", table_name, page.len());
            items.extend(page);
        }

        last_evaluated_key = resp.last_evaluated_key;
        if last_evaluated_key.is_none() {
            break;
        }
        tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", table_name);
    }

    Ok(items)
}

fn corrupt(table_name: &str, item: &Item) -> RepoError {
    let id = item
        .iter()
        .find(|(k, _)| k.ends_with("_id"))
        .and_then(|(_, v)| v.as_s().ok());
    tracing::error!(item.id = ?id, %table_name, "DynamoDB: Failed to parse item");
    RepoError::DataCorruption(format!("Failed to parse item {:?} from table '{}'", id, table_name))
}

fn put_opt(item: &mut Item, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        item.insert(key.to_string(), AttributeValue::S(value.to_string()));
    }
}

fn get_s<'a>(item: &'a Item, key: &str) -> Option<&'a str> {
    item.get(key)?.as_s().ok().map(String::as_str)
}

fn get_uuid(item: &Item, key: &str) -> Option<Uuid> {
    get_s(item, key).and_then(|s| Uuid::parse_str(s).ok())
}

fn get_time(item: &Item, key: &str) -> Option<DateTime<Utc>> {
    get_s(item, key)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn meme_to_item(meme: &Meme) -> Item {
    let mut item = HashMap::from([
        ("meme_id".to_string(), AttributeValue::S(meme.id.to_string())),
        ("url".to_string(), AttributeValue::S(meme.url.clone())),
        ("user_id".to_string(), AttributeValue::S(meme.user_id.to_string())),
        ("created_at".to_string(), AttributeValue::S(meme.created_at.to_rfc3339())),
    ]);
    put_opt(&mut item, "caption", meme.caption.as_deref());
    put_opt(&mut item, "caption_top", meme.caption_top.as_deref());
    put_opt(&mut item, "caption_bottom", meme.caption_bottom.as_deref());
    put_opt(&mut item, "category", meme.category.as_deref());
    put_opt(&mut item, "template_id", meme.template_id.map(|id| id.to_string()).as_deref());
    item
}

fn item_to_meme(item: &Item) -> Option<Meme> {
    Some(Meme {
        id: get_uuid(item, "meme_id")?,
        url: get_s(item, "url")?.to_string(),
        caption: get_s(item, "caption").map(str::to_string),
        caption_top: get_s(item, "caption_top").map(str::to_string),
        caption_bottom: get_s(item, "caption_bottom").map(str::to_string),
        category: get_s(item, "category").map(str::to_string),
        template_id: get_uuid(item, "template_id"),
        user_id: UserId::new(get_s(item, "user_id")?),
        created_at: get_time(item, "created_at")?,
    })
}

fn item_to_reaction(item: &Item) -> Option<Reaction> {
    Some(Reaction {
        id: get_uuid(item, "reaction_id")?,
        meme_id: get_uuid(item, "meme_id")?,
        user_id: UserId::new(get_s(item, "user_id")?),
        kind: get_s(item, "reaction_type")?.parse().ok()?,
        created_at: get_time(item, "created_at")?,
    })
}

fn reaction_key(reaction: &Reaction) -> Item {
    HashMap::from([
        (REACTION_HASH_KEY.to_string(), AttributeValue::S(reaction.meme_id.to_string())),
        (REACTION_RANGE_KEY.to_string(), AttributeValue::S(reaction.id.to_string())),
    ])
}

fn item_to_template(item: &Item) -> Option<Template> {
    Some(Template {
        id: get_uuid(item, "template_id")?,
        name: get_s(item, "name")?.to_string(),
        url: get_s(item, "url")?.to_string(),
        category: get_s(item, "category").map(str::to_string),
        created_at: get_time(item, "created_at")?,
    })
}

// --- Memes ---

#[derive(Debug, Clone)]
pub struct DynamoDbMemeRepository {
    client: DynamoDbClient,
    table_name: String,
    reactions_table: String,
}

impl DynamoDbMemeRepository {
    pub fn new(client: DynamoDbClient, table_name: String, reactions_table: String) -> Self {
        info!(%table_name, %reactions_table, "Initializing DynamoDbMemeRepository");
        Self { client, table_name, reactions_table }
    }
}

#[async_trait]
impl MemeRepository for DynamoDbMemeRepository {
    /// Stores a `Meme` using PutItem.
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(meme_to_item(meme)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put meme (id: {})", self.table_name, meme.id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    /// Scans memes and reactions and joins them, newest meme first.
    async fn list_with_reactions(&self) -> Result<Vec<MemeWithReactions>, RepoError> {
        let meme_items = scan_all(&self.client, &self.table_name).await?;
        let reaction_items = scan_all(&self.client, &self.reactions_table).await?;

        let mut by_meme: HashMap<Uuid, Vec<ReactionRef>> = HashMap::new();
        for item in &reaction_items {
            let reaction = item_to_reaction(item).ok_or_else(|| corrupt(&self.reactions_table, item))?;
            by_meme
                .entry(reaction.meme_id)
                .or_default()
                .push(ReactionRef::from(&reaction));
        }

        let mut memes = meme_items
            .iter()
            .map(|item| item_to_meme(item).ok_or_else(|| corrupt(&self.table_name, item)))
            .collect::<Result<Vec<_>, _>>()?;
        memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        info!(
            "DynamoDB (table: {}): Listed {} memes with {} reactions",
            self.table_name,
            memes.len(),
            reaction_items.len()
        );
        Ok(memes
            .into_iter()
            .map(|meme| {
                let reactions = by_meme.remove(&meme.id).unwrap_or_default();
                MemeWithReactions { meme, reactions }
            })
            .collect())
    }
}

// --- Reactions ---

#[derive(Debug, Clone)]
pub struct DynamoDbReactionRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbReactionRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbReactionRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl ReactionRepository for DynamoDbReactionRepository {
    /// Queries the meme's partition with a consistent read, filtered to the user.
    async fn find(&self, meme_id: Uuid, user_id: &UserId) -> Result<Reaction, RepoError> {
        let mut items: Vec<Item> = Vec::new();
        let mut last_evaluated_key: Option<Item> = None;

        loop {
            let resp = self
                .client
                .query()
                .table_name(&self.table_name)
                .consistent_read(true)
                .key_condition_expression("meme_id = :meme_id")
                .filter_expression("user_id = :user_id")
                .expression_attribute_values(":meme_id", AttributeValue::S(meme_id.to_string()))
                .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
                .set_exclusive_start_key(last_evaluated_key)
                .send()
                .await
                .context(format!(
                    "DynamoDB (table: {}): Failed to query reaction (meme: {}, user: {})",
                    self.table_name, meme_id, user_id
                ))
                .map_err(RepoError::BackendError)?;

            items.extend(resp.items.unwrap_or_default());
            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        if items.len() > 1 {
            tracing::warn!(%meme_id, user = %user_id, rows = items.len(), "DynamoDB: Found duplicate reactions, using the first");
        }
        let Some(item) = items.first() else {
            return Err(RepoError::NotFound(format!("reaction on meme {} by {}", meme_id, user_id)));
        };
        item_to_reaction(item).ok_or_else(|| corrupt(&self.table_name, item))
    }

    async fn insert(&self, reaction: &Reaction) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("reaction_id", AttributeValue::S(reaction.id.to_string()))
            .item("meme_id", AttributeValue::S(reaction.meme_id.to_string()))
            .item("user_id", AttributeValue::S(reaction.user_id.to_string()))
            .item("reaction_type", AttributeValue::S(reaction.kind.to_string()))
            .item("created_at", AttributeValue::S(reaction.created_at.to_rfc3339()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put reaction (id: {})", self.table_name, reaction.id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn update_kind(&self, existing: &Reaction, kind: ReactionKind) -> Result<(), RepoError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(reaction_key(existing)))
            .update_expression("SET reaction_type = :kind")
            .condition_expression("attribute_exists(reaction_id)")
            .expression_attribute_values(":kind", AttributeValue::S(kind.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                Err(RepoError::NotFound(format!("reaction {}", existing.id)))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to update reaction (id: {})",
                self.table_name, existing.id
            )))),
        }
    }

    async fn delete(&self, existing: &Reaction) -> Result<(), RepoError> {
        tracing::debug!(reaction_id = %existing.id, table_name = %self.table_name, "DynamoDB: Deleting item");
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(reaction_key(existing)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete reaction (id: {})", self.table_name, existing.id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }
}

// --- Templates ---

#[derive(Debug, Clone)]
pub struct DynamoDbTemplateRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbTemplateRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbTemplateRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl TemplateRepository for DynamoDbTemplateRepository {
    async fn list(&self) -> Result<Vec<Template>, RepoError> {
        let mut templates = scan_all(&self.client, &self.table_name)
            .await?
            .iter()
            .map(|item| item_to_template(item).ok_or_else(|| corrupt(&self.table_name, item)))
            .collect::<Result<Vec<_>, _>>()?;
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Template>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .consistent_read(true)
            .key("template_id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get template (id: {})", self.table_name, id))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_template(&item)
                .map(Some)
                .ok_or_else(|| corrupt(&self.table_name, &item)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meme_item_keeps_optional_fields_absent() {
        let meme = Meme {
            id: Uuid::new_v4(),
            url: "https://cdn.example/a.png".into(),
            caption: Some("hi".into()),
            caption_top: None,
            caption_bottom: None,
            category: None,
            template_id: Some(Uuid::new_v4()),
            user_id: UserId::new("alice"),
            created_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap().with_timezone(&Utc),
        };
        let item = meme_to_item(&meme);
        assert!(!item.contains_key("caption_top"));
        assert!(!item.contains_key("category"));
        assert_eq!(item_to_meme(&item), Some(meme));
    }

    #[test]
    fn reaction_key_addresses_the_base_table_row() {
        let reaction = Reaction::new(Uuid::new_v4(), UserId::new("alice"), ReactionKind::Heart);
        let key = reaction_key(&reaction);
        assert_eq!(key.len(), 2);
        assert_eq!(key[REACTION_HASH_KEY], AttributeValue::S(reaction.meme_id.to_string()));
        assert_eq!(key[REACTION_RANGE_KEY], AttributeValue::S(reaction.id.to_string()));
    }

    #[test]
    fn reaction_item_with_unknown_kind_is_rejected() {
        let item: Item = HashMap::from([
            ("reaction_id".to_string(), AttributeValue::S(Uuid::new_v4().to_string())),
            ("meme_id".to_string(), AttributeValue::S(Uuid::new_v4().to_string())),
            ("user_id".to_string(), AttributeValue::S("alice".into())),
            ("reaction_type".to_string(), AttributeValue::S("angry".into())),
            ("created_at".to_string(), AttributeValue::S("2024-05-01T12:00:00Z".into())),
        ]);
        assert_eq!(item_to_reaction(&item), None);
    }
}
