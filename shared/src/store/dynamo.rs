//! Single-table DynamoDB adapter.
//!
//! Key layout:
//!
//! | PK             | SK                   | item            |
//! |----------------|----------------------|-----------------|
//! | `USERS`        | `USER#{id}`          | user record     |
//! | `USER#{id}`    | `PROFILE`            | profile         |
//! | `USER#{id}`    | `PROGRESS#{course}`  | course progress |
//! | `CATALOG`      | `COURSE#{id}`        | course          |
//! | `COURSE#{id}`  | `LECTURE#{id}`       | lecture         |
//! | `BLOGS`        | `BLOG#{id}`          | blog post       |
//! | `RESOURCES`    | `RESOURCE#{id}`      | resource        |

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{
    AttributeValue, Delete, DeleteRequest, Put, ReturnValue, TransactWriteItem, Update, WriteRequest,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::{BTreeSet, HashMap};

use super::{BlogStore, CatalogStore, ProgressStore, ResourceStore, UserStore};
use crate::error::{AppError, Result};
use crate::types::{
    BlogPost, Course, CourseProgress, Lecture, Profile, Resource, ResourceType, Role, User, UserProgress, Year,
};

type Item = HashMap<String, AttributeValue>;

/// DynamoDB caps a transaction at 100 actions.
const TRANSACTION_LIMIT: usize = 100;
/// and a batch write at 25 requests.
const BATCH_LIMIT: usize = 25;
const MAX_BATCH_ATTEMPTS: u32 = 5;

const USERS_PK: &str = "USERS";
const CATALOG_PK: &str = "CATALOG";
const BLOGS_PK: &str = "BLOGS";
const RESOURCES_PK: &str = "RESOURCES";

pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", s(pk))
            .key("SK", s(sk))
            .send()
            .await?;
        Ok(result.item().cloned())
    }

    /// All items of one partition whose sort key starts with `sk_prefix`, following pagination.
    async fn query_partition(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                .expression_attribute_values(":pk", s(pk))
                .expression_attribute_values(":sk_prefix", s(sk_prefix))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await?;

            items.extend(result.items().iter().cloned());

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    /// Puts an item that must already exist. `NotFound` otherwise.
    async fn replace(&self, item: Item, entity: &'static str, id: &str) -> Result<()> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_conditional_failure(&e) => Err(AppError::not_found(entity, id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_existing(&self, pk: &str, sk: &str, entity: &'static str, id: &str) -> Result<()> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", s(pk))
            .key("SK", s(sk))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_conditional_failure(&e) => Err(AppError::not_found(entity, id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes keys in batches of 25, retrying unprocessed requests with backoff.
    async fn batch_delete(&self, keys: Vec<Item>) -> Result<()> {
        for chunk in keys.chunks(BATCH_LIMIT) {
            let mut requests = Vec::with_capacity(chunk.len());
            for key in chunk {
                requests.push(
                    WriteRequest::builder()
                        .delete_request(DeleteRequest::builder().set_key(Some(key.clone())).build()?)
                        .build(),
                );
            }

            let mut attempts = 0u32;
            let mut requests = requests;

            loop {
                attempts += 1;
                let result = self
                    .client
                    .batch_write_item()
                    .request_items(&self.table_name, requests)
                    .send()
                    .await?;

                let pending = result
                    .unprocessed_items()
                    .and_then(|items| items.get(&self.table_name))
                    .filter(|items| !items.is_empty())
                    .cloned();

                match pending {
                    None => break,
                    Some(pending) if attempts >= MAX_BATCH_ATTEMPTS => {
                        tracing::error!(remaining = pending.len(), attempts, "Giving up on unprocessed deletes");
                        return Err(unprocessed_deletes(pending.len(), attempts));
                    }
                    Some(pending) => {
                        tracing::debug!(pending = pending.len(), attempts, "Retrying unprocessed deletes");
                        tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempts as u64)).await;
                        requests = pending;
                    }
                }
            }
        }
        Ok(())
    }
}

fn unprocessed_deletes(remaining: usize, attempts: u32) -> AppError {
    AppError::ExternalService(format!(
        "{} deletes still unprocessed after {} attempts",
        remaining, attempts
    ))
}

/// Groups a course delete into transactions: lectures first, the course key last,
/// so an interrupted delete leaves the course in place and can be retried.
fn course_delete_groups(course_key: Item, lecture_keys: Vec<Item>) -> Vec<Vec<Item>> {
    let mut keys = lecture_keys;
    keys.push(course_key);
    keys.chunks(TRANSACTION_LIMIT).map(|chunk| chunk.to_vec()).collect()
}

// ========== ATTRIBUTE HELPERS ==========

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

fn string_list(values: &[String]) -> AttributeValue {
    AttributeValue::L(values.iter().map(|v| s(v.as_str())).collect())
}

fn key(pk: impl Into<String>, sk: impl Into<String>) -> Item {
    let mut key = HashMap::new();
    key.insert("PK".to_string(), s(pk));
    key.insert("SK".to_string(), s(sk));
    key
}

fn get_s(item: &Item, name: &str) -> String {
    item.get(name).and_then(|v| v.as_s().ok()).map(|s| s.to_string()).unwrap_or_default()
}

fn get_opt_s(item: &Item, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

fn get_list(item: &Item, name: &str) -> Vec<String> {
    item.get(name)
        .and_then(|v| v.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_s().ok().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn get_set(item: &Item, name: &str) -> BTreeSet<String> {
    item.get(name)
        .and_then(|v| v.as_ss().ok())
        .map(|values| values.iter().cloned().collect())
        .unwrap_or_default()
}

fn get_n<T: std::str::FromStr>(item: &Item, name: &str) -> Option<T> {
    item.get(name).and_then(|v| v.as_n().ok()).and_then(|n| n.parse().ok())
}

fn get_bool(item: &Item, name: &str) -> bool {
    item.get(name).and_then(|v| v.as_bool().ok()).copied().unwrap_or(false)
}

fn get_year(item: &Item) -> Result<Year> {
    let raw: u8 = get_n(item, "year").unwrap_or(0);
    Year::try_from(raw).map_err(|_| {
        AppError::ExternalService(format!(
            "stored item {} has invalid year {}",
            get_s(item, "SK"),
            raw
        ))
    })
}

fn is_conditional_failure<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    err.as_service_error()
        .and_then(|e| e.code())
        .map(|code| code == "ConditionalCheckFailedException")
        .unwrap_or(false)
}

fn transaction_hit_condition<R>(err: &SdkError<TransactWriteItemsError, R>) -> bool {
    match err.as_service_error() {
        Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) => cancelled
            .cancellation_reasons()
            .iter()
            .any(|reason| reason.code() == Some("ConditionalCheckFailed")),
        _ => false,
    }
}

// ========== ITEM MAPPING ==========

fn user_to_item(user: &User) -> Item {
    let mut item = key(USERS_PK, format!("USER#{}", user.user_id));
    item.insert("user_id".to_string(), s(user.user_id.as_str()));
    item.insert("full_name".to_string(), s(user.full_name.as_str()));
    item.insert("email".to_string(), s(user.email.as_str()));
    item.insert("role".to_string(), s(user.role.as_str()));
    item.insert("enrolled_courses".to_string(), string_list(&user.enrolled_courses));
    item.insert("profile_completed".to_string(), AttributeValue::Bool(user.profile_completed));
    if let Some(avatar) = &user.avatar_url {
        item.insert("avatar_url".to_string(), s(avatar.as_str()));
    }
    item.insert("created_at".to_string(), s(user.created_at.as_str()));
    item
}

fn user_from_item(item: &Item) -> User {
    User {
        user_id: get_s(item, "user_id"),
        full_name: get_s(item, "full_name"),
        email: get_s(item, "email"),
        role: Role::parse(&get_s(item, "role")),
        enrolled_courses: get_list(item, "enrolled_courses"),
        profile_completed: get_bool(item, "profile_completed"),
        avatar_url: get_opt_s(item, "avatar_url"),
        created_at: get_s(item, "created_at"),
    }
}

fn profile_to_item(profile: &Profile) -> Item {
    let mut item = key(format!("USER#{}", profile.user_id), "PROFILE");
    item.insert("user_id".to_string(), s(profile.user_id.as_str()));
    item.insert("phone".to_string(), s(profile.phone.as_str()));
    item.insert("year".to_string(), AttributeValue::N(profile.year.to_string()));
    item.insert("topics".to_string(), string_list(&profile.topics));
    if let Some(image_url) = &profile.image_url {
        item.insert("image_url".to_string(), s(image_url.as_str()));
    }
    item.insert("updated_at".to_string(), s(profile.updated_at.as_str()));
    item
}

fn profile_from_item(item: &Item) -> Result<Profile> {
    Ok(Profile {
        user_id: get_s(item, "user_id"),
        phone: get_s(item, "phone"),
        year: get_year(item)?,
        topics: get_list(item, "topics"),
        image_url: get_opt_s(item, "image_url"),
        updated_at: get_s(item, "updated_at"),
    })
}

fn course_to_item(course: &Course) -> Item {
    let mut item = key(CATALOG_PK, format!("COURSE#{}", course.course_id));
    item.insert("course_id".to_string(), s(course.course_id.as_str()));
    item.insert("title".to_string(), s(course.title.as_str()));
    item.insert("description".to_string(), s(course.description.as_str()));
    item.insert("category".to_string(), s(course.category.as_str()));
    item.insert("year".to_string(), AttributeValue::N(course.year.to_string()));
    item.insert("topics".to_string(), string_list(&course.topics));
    item.insert("lectures_order".to_string(), string_list(&course.lectures_order));
    item.insert("total_lectures".to_string(), AttributeValue::N(course.total_lectures.to_string()));
    if let Some(thumbnail) = &course.thumbnail {
        item.insert("thumbnail".to_string(), s(thumbnail.as_str()));
    }
    item.insert("created_at".to_string(), s(course.created_at.as_str()));
    if let Some(updated_at) = &course.updated_at {
        item.insert("updated_at".to_string(), s(updated_at.as_str()));
    }
    item
}

fn course_from_item(item: &Item) -> Result<Course> {
    let lectures_order = get_list(item, "lectures_order");
    Ok(Course {
        course_id: get_s(item, "course_id"),
        title: get_s(item, "title"),
        description: get_s(item, "description"),
        category: get_s(item, "category"),
        year: get_year(item)?,
        topics: get_list(item, "topics"),
        total_lectures: get_n(item, "total_lectures").unwrap_or(lectures_order.len() as u32),
        lectures_order,
        thumbnail: get_opt_s(item, "thumbnail"),
        created_at: get_s(item, "created_at"),
        updated_at: get_opt_s(item, "updated_at"),
    })
}

fn lecture_key(course_id: &str, lecture_id: &str) -> Item {
    key(format!("COURSE#{}", course_id), format!("LECTURE#{}", lecture_id))
}

fn lecture_to_item(course_id: &str, lecture: &Lecture) -> Item {
    let mut item = lecture_key(course_id, &lecture.lecture_id);
    item.insert("lecture_id".to_string(), s(lecture.lecture_id.as_str()));
    item.insert("title".to_string(), s(lecture.title.as_str()));
    item.insert("description".to_string(), s(lecture.description.as_str()));
    item.insert("video_url".to_string(), s(lecture.video_url.as_str()));
    item.insert("duration".to_string(), s(lecture.duration.as_str()));
    if let Some(order) = lecture.order {
        item.insert("order".to_string(), AttributeValue::N(order.to_string()));
    }
    if let Some(thumbnail) = &lecture.thumbnail {
        item.insert("thumbnail".to_string(), s(thumbnail.as_str()));
    }
    item
}

fn lecture_from_item(item: &Item) -> Lecture {
    Lecture {
        lecture_id: get_s(item, "lecture_id"),
        title: get_s(item, "title"),
        description: get_s(item, "description"),
        video_url: get_s(item, "video_url"),
        duration: get_s(item, "duration"),
        order: get_n(item, "order"),
        thumbnail: get_opt_s(item, "thumbnail"),
    }
}

fn progress_from_item(item: &Item) -> CourseProgress {
    CourseProgress {
        completed_lecture_ids: get_set(item, "completed_lecture_ids"),
        last_accessed: get_opt_s(item, "last_accessed"),
    }
}

fn blog_to_item(blog: &BlogPost) -> Item {
    let mut item = key(BLOGS_PK, format!("BLOG#{}", blog.blog_id));
    item.insert("blog_id".to_string(), s(blog.blog_id.as_str()));
    item.insert("title".to_string(), s(blog.title.as_str()));
    item.insert("summary".to_string(), s(blog.summary.as_str()));
    item.insert("content".to_string(), s(blog.content.as_str()));
    item.insert("category".to_string(), s(blog.category.as_str()));
    item.insert("tags".to_string(), string_list(&blog.tags));
    if let Some(image_url) = &blog.image_url {
        item.insert("image_url".to_string(), s(image_url.as_str()));
    }
    item.insert("read_time".to_string(), s(blog.read_time.as_str()));
    item.insert("date".to_string(), s(blog.date.as_str()));
    item.insert("created_at".to_string(), s(blog.created_at.as_str()));
    item.insert("updated_at".to_string(), s(blog.updated_at.as_str()));
    item
}

fn blog_from_item(item: &Item) -> BlogPost {
    BlogPost {
        blog_id: get_s(item, "blog_id"),
        title: get_s(item, "title"),
        summary: get_s(item, "summary"),
        content: get_s(item, "content"),
        category: get_s(item, "category"),
        tags: get_list(item, "tags"),
        image_url: get_opt_s(item, "image_url"),
        read_time: get_s(item, "read_time"),
        date: get_s(item, "date"),
        created_at: get_s(item, "created_at"),
        updated_at: get_s(item, "updated_at"),
    }
}

fn resource_to_item(resource: &Resource) -> Item {
    let mut item = key(RESOURCES_PK, format!("RESOURCE#{}", resource.resource_id));
    item.insert("resource_id".to_string(), s(resource.resource_id.as_str()));
    item.insert("title".to_string(), s(resource.title.as_str()));
    item.insert("url".to_string(), s(resource.url.as_str()));
    item.insert("description".to_string(), s(resource.description.as_str()));
    item.insert("type".to_string(), s(resource.resource_type.as_str()));
    item
}

fn resource_from_item(item: &Item) -> Resource {
    Resource {
        resource_id: get_s(item, "resource_id"),
        title: get_s(item, "title"),
        url: get_s(item, "url"),
        description: get_s(item, "description"),
        resource_type: ResourceType::parse(&get_s(item, "type")).unwrap_or_default(),
    }
}

// ========== PORT IMPLEMENTATIONS ==========

#[async_trait]
impl UserStore for DynamoStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(user_to_item(user)))
            .send()
            .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self
            .get(USERS_PK, &format!("USER#{}", user_id))
            .await?
            .map(|item| user_from_item(&item)))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let items = self.query_partition(USERS_PK, "USER#").await?;
        Ok(items.iter().map(user_from_item).collect())
    }

    async fn set_role(&self, user_id: &str, role: Role) -> Result<()> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(USERS_PK))
            .key("SK", s(format!("USER#{}", user_id)))
            .update_expression("SET #role = :role")
            .condition_expression("attribute_exists(PK)")
            .expression_attribute_names("#role", "role")
            .expression_attribute_values(":role", s(role.as_str()))
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_conditional_failure(&e) => Err(AppError::not_found("user", user_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_enrollment(&self, user_id: &str, course_ids: &[String]) -> Result<()> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(USERS_PK))
            .key("SK", s(format!("USER#{}", user_id)))
            .update_expression("SET enrolled_courses = :courses")
            .condition_expression("attribute_exists(PK)")
            .expression_attribute_values(":courses", string_list(course_ids))
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_conditional_failure(&e) => Err(AppError::not_found("user", user_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        match self.get(&format!("USER#{}", user_id), "PROFILE").await? {
            Some(item) => Ok(Some(profile_from_item(&item)?)),
            None => Ok(None),
        }
    }

    async fn save_profile_with_enrollment(&self, profile: &Profile, course_ids: &[String]) -> Result<()> {
        let profile_put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(profile_to_item(profile)))
            .build()?;

        let mut expression = "SET enrolled_courses = :courses, profile_completed = :done".to_string();
        let mut user_update = Update::builder()
            .table_name(&self.table_name)
            .key("PK", s(USERS_PK))
            .key("SK", s(format!("USER#{}", profile.user_id)))
            .condition_expression("attribute_exists(PK)")
            .expression_attribute_values(":courses", string_list(course_ids))
            .expression_attribute_values(":done", AttributeValue::Bool(true));
        if let Some(image_url) = &profile.image_url {
            expression.push_str(", avatar_url = :avatar");
            user_update = user_update.expression_attribute_values(":avatar", s(image_url.as_str()));
        }
        let user_update = user_update.update_expression(expression).build()?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(profile_put).build())
            .transact_items(TransactWriteItem::builder().update(user_update).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if transaction_hit_condition(&e) => {
                Err(AppError::not_found("user", profile.user_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CatalogStore for DynamoStore {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        let items = self.query_partition(CATALOG_PK, "COURSE#").await?;
        items.iter().map(course_from_item).collect()
    }

    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        match self.get(CATALOG_PK, &format!("COURSE#{}", course_id)).await? {
            Some(item) => Ok(Some(course_from_item(&item)?)),
            None => Ok(None),
        }
    }

    async fn list_lectures(&self, course_id: &str) -> Result<Vec<Lecture>> {
        let items = self
            .query_partition(&format!("COURSE#{}", course_id), "LECTURE#")
            .await?;
        Ok(items.iter().map(lecture_from_item).collect())
    }

    /// Lectures go first, in transactions of up to 100 items, and the course item is
    /// written in the last one. Readers only discover lectures through the course item,
    /// so a course never appears half-built. If a later chunk fails, the lectures
    /// already written are deleted again.
    async fn create_course(&self, course: &Course, lectures: &[Lecture]) -> Result<()> {
        let mut actions = Vec::with_capacity(lectures.len() + 1);
        for lecture in lectures {
            let put = Put::builder()
                .table_name(&self.table_name)
                .set_item(Some(lecture_to_item(&course.course_id, lecture)))
                .build()?;
            actions.push(TransactWriteItem::builder().put(put).build());
        }
        let course_put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(course_to_item(course)))
            .condition_expression("attribute_not_exists(PK)")
            .build()?;
        actions.push(TransactWriteItem::builder().put(course_put).build());

        let mut written = 0usize;
        for chunk in actions.chunks(TRANSACTION_LIMIT) {
            let result = self
                .client
                .transact_write_items()
                .set_transact_items(Some(chunk.to_vec()))
                .send()
                .await;

            if let Err(e) = result {
                let err = if transaction_hit_condition(&e) {
                    AppError::ExternalService(format!("course {} already exists", course.course_id))
                } else {
                    AppError::from(e)
                };
                tracing::error!(
                    course_id = %course.course_id,
                    written,
                    "Course creation failed, rolling back lectures: {}",
                    err
                );
                let written_keys: Vec<Item> = lectures[..written.min(lectures.len())]
                    .iter()
                    .map(|l| lecture_key(&course.course_id, &l.lecture_id))
                    .collect();
                if let Err(cleanup) = self.batch_delete(written_keys).await {
                    tracing::error!(
                        course_id = %course.course_id,
                        "Lecture rollback failed: {}",
                        cleanup
                    );
                }
                return Err(err);
            }
            written += chunk.len();
        }

        tracing::info!(
            course_id = %course.course_id,
            lectures = lectures.len(),
            "Course written"
        );
        Ok(())
    }

    async fn update_course(&self, course: &Course) -> Result<()> {
        self.replace(course_to_item(course), "course", &course.course_id).await
    }

    /// Lecture keys are read before anything is deleted. Each group is one
    /// transaction and the course item goes in the last, conditioned on existing.
    async fn delete_course(&self, course_id: &str) -> Result<()> {
        let lecture_keys: Vec<Item> = self
            .query_partition(&format!("COURSE#{}", course_id), "LECTURE#")
            .await?
            .iter()
            .map(|item| key(get_s(item, "PK"), get_s(item, "SK")))
            .collect();
        tracing::info!(course_id, lectures = lecture_keys.len(), "Deleting course");

        let course_key = key(CATALOG_PK, format!("COURSE#{}", course_id));
        let groups = course_delete_groups(course_key, lecture_keys);
        let last = groups.len() - 1;
        for (index, group) in groups.into_iter().enumerate() {
            let mut actions = Vec::with_capacity(group.len());
            for (position, item_key) in group.iter().enumerate() {
                let mut delete = Delete::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(item_key.clone()));
                if index == last && position == group.len() - 1 {
                    delete = delete.condition_expression("attribute_exists(PK)");
                }
                actions.push(TransactWriteItem::builder().delete(delete.build()?).build());
            }

            let result = self
                .client
                .transact_write_items()
                .set_transact_items(Some(actions))
                .send()
                .await;
            match result {
                Ok(_) => {}
                Err(e) if transaction_hit_condition(&e) => {
                    return Err(AppError::not_found("course", course_id));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for DynamoStore {
    async fn get_progress(&self, user_id: &str) -> Result<UserProgress> {
        let items = self
            .query_partition(&format!("USER#{}", user_id), "PROGRESS#")
            .await?;

        let mut progress = UserProgress::empty(user_id);
        for item in &items {
            let course_id = get_s(item, "course_id");
            if course_id.is_empty() {
                continue;
            }
            progress.courses.insert(course_id, progress_from_item(item));
        }
        Ok(progress)
    }

    /// One atomic string-set ADD or DELETE, so concurrent toggles on different
    /// lectures of the same course never overwrite each other.
    async fn set_lecture_completed(
        &self,
        user_id: &str,
        course_id: &str,
        lecture_id: &str,
        completed: bool,
        accessed_at: &str,
    ) -> Result<CourseProgress> {
        let set_clause = "SET last_accessed = :ts, course_id = :cid";
        let expression = if completed {
            format!("{} ADD completed_lecture_ids :lecture", set_clause)
        } else {
            format!("{} DELETE completed_lecture_ids :lecture", set_clause)
        };

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(format!("USER#{}", user_id)))
            .key("SK", s(format!("PROGRESS#{}", course_id)))
            .update_expression(expression)
            .expression_attribute_values(":ts", s(accessed_at))
            .expression_attribute_values(":cid", s(course_id))
            .expression_attribute_values(":lecture", AttributeValue::Ss(vec![lecture_id.to_string()]))
            .return_values(ReturnValue::AllNew)
            .send()
            .await?;

        Ok(result
            .attributes()
            .map(progress_from_item)
            .unwrap_or_default())
    }
}

#[async_trait]
impl BlogStore for DynamoStore {
    async fn list_blogs(&self) -> Result<Vec<BlogPost>> {
        let items = self.query_partition(BLOGS_PK, "BLOG#").await?;
        Ok(items.iter().map(blog_from_item).collect())
    }

    async fn get_blog(&self, blog_id: &str) -> Result<Option<BlogPost>> {
        Ok(self
            .get(BLOGS_PK, &format!("BLOG#{}", blog_id))
            .await?
            .map(|item| blog_from_item(&item)))
    }

    async fn put_blog(&self, blog: &BlogPost) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(blog_to_item(blog)))
            .send()
            .await?;
        Ok(())
    }

    async fn delete_blog(&self, blog_id: &str) -> Result<()> {
        self.delete_existing(BLOGS_PK, &format!("BLOG#{}", blog_id), "blog", blog_id)
            .await
    }
}

#[async_trait]
impl ResourceStore for DynamoStore {
    async fn list_resources(&self) -> Result<Vec<Resource>> {
        let items = self.query_partition(RESOURCES_PK, "RESOURCE#").await?;
        Ok(items.iter().map(resource_from_item).collect())
    }

    async fn get_resource(&self, resource_id: &str) -> Result<Option<Resource>> {
        Ok(self
            .get(RESOURCES_PK, &format!("RESOURCE#{}", resource_id))
            .await?
            .map(|item| resource_from_item(&item)))
    }

    async fn put_resource(&self, resource: &Resource) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(resource_to_item(resource)))
            .send()
            .await?;
        Ok(())
    }

    async fn delete_resource(&self, resource_id: &str) -> Result<()> {
        self.delete_existing(
            RESOURCES_PK,
            &format!("RESOURCE#{}", resource_id),
            "resource",
            resource_id,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_course() -> Course {
        Course {
            course_id: "c1".to_string(),
            title: "Algorithms".to_string(),
            description: "Sorting and searching".to_string(),
            category: "CS".to_string(),
            year: Year::try_from(2).unwrap(),
            topics: vec!["Algorithms".to_string()],
            lectures_order: vec!["l2".to_string(), "l1".to_string()],
            total_lectures: 2,
            thumbnail: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: None,
        }
    }

    #[test]
    fn course_item_keeps_lecture_order() {
        let course = sample_course();
        let item = course_to_item(&course);
        assert_eq!(get_s(&item, "PK"), "CATALOG");
        assert_eq!(get_s(&item, "SK"), "COURSE#c1");
        assert_eq!(course_from_item(&item).unwrap(), course);
    }

    #[test]
    fn invalid_stored_year_is_reported() {
        let mut item = course_to_item(&sample_course());
        item.insert("year".to_string(), AttributeValue::N("9".to_string()));
        assert!(matches!(course_from_item(&item), Err(AppError::ExternalService(_))));
    }

    #[test]
    fn missing_progress_set_reads_as_empty() {
        let mut item = key("USER#u1", "PROGRESS#c1");
        item.insert("course_id".to_string(), s("c1"));
        let progress = progress_from_item(&item);
        assert!(progress.completed_lecture_ids.is_empty());
        assert_eq!(progress.last_accessed, None);
    }

    #[test]
    fn unknown_resource_type_falls_back_to_link() {
        let mut item = key(RESOURCES_PK, "RESOURCE#r1");
        item.insert("type".to_string(), s("Podcast"));
        assert_eq!(resource_from_item(&item).resource_type, ResourceType::Link);
    }

    #[test]
    fn course_key_is_deleted_in_the_last_transaction() {
        let course_key = key(CATALOG_PK, "COURSE#c1");
        let lectures: Vec<Item> = (0..250).map(|i| lecture_key("c1", &format!("l{}", i))).collect();
        let groups = course_delete_groups(course_key.clone(), lectures);

        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![100, 100, 51]);
        assert_eq!(groups.last().unwrap().last().unwrap(), &course_key);
        assert!(groups[..2].iter().flatten().all(|k| get_s(k, "PK") == "COURSE#c1"));
    }

    #[test]
    fn small_course_deletes_in_one_transaction() {
        let course_key = key(CATALOG_PK, "COURSE#c1");
        let lectures = vec![lecture_key("c1", "l1"), lecture_key("c1", "l2")];
        let groups = course_delete_groups(course_key.clone(), lectures);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
        assert_eq!(groups[0][2], course_key);
    }

    #[test]
    fn exhausted_delete_retries_surface_as_retryable_failure() {
        let err = unprocessed_deletes(3, MAX_BATCH_ATTEMPTS);
        assert!(matches!(err, AppError::ExternalService(_)));
        assert!(err.is_retryable());
    }
}
