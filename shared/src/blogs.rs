//! Blog posts. Everyone reads, admins write.

use crate::error::{AppError, Result};
use crate::session::Session;
use crate::store::Store;
use crate::types::{BlogPost, CreateBlogRequest, UpdateBlogRequest};

const DEFAULT_READ_TIME: &str = "5 min";

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned
}

fn required(value: String, field: &str) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        Err(AppError::validation(format!("{} is required", field)))
    } else {
        Ok(value)
    }
}

/// Newest first
pub async fn list_blogs(store: &dyn Store) -> Result<Vec<BlogPost>> {
    let mut blogs = store.list_blogs().await?;
    blogs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(blogs)
}

pub async fn get_blog(store: &dyn Store, blog_id: &str) -> Result<BlogPost> {
    store
        .get_blog(blog_id)
        .await?
        .ok_or_else(|| AppError::not_found("blog", blog_id))
}

pub async fn create_blog(store: &dyn Store, session: &Session, req: CreateBlogRequest) -> Result<BlogPost> {
    session.require_admin()?;
    let now = chrono::Utc::now();
    let blog = BlogPost {
        blog_id: uuid::Uuid::new_v4().to_string(),
        title: required(req.title, "title")?,
        summary: req.summary.trim().to_string(),
        content: required(req.content, "content")?,
        category: req.category.trim().to_string(),
        tags: clean_tags(req.tags),
        image_url: req.image_url.filter(|u| !u.trim().is_empty()),
        read_time: req
            .read_time
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_READ_TIME.to_string()),
        date: now.format("%Y-%m-%d").to_string(),
        created_at: now.to_rfc3339(),
        updated_at: now.to_rfc3339(),
    };
    store.put_blog(&blog).await?;
    tracing::info!(blog_id = %blog.blog_id, admin = %session.user_id, "Blog published");
    Ok(blog)
}

pub async fn update_blog(
    store: &dyn Store,
    session: &Session,
    blog_id: &str,
    req: UpdateBlogRequest,
) -> Result<BlogPost> {
    session.require_admin()?;
    let mut blog = get_blog(store, blog_id).await?;

    if let Some(title) = req.title {
        blog.title = required(title, "title")?;
    }
    if let Some(content) = req.content {
        blog.content = required(content, "content")?;
    }
    if let Some(summary) = req.summary {
        blog.summary = summary.trim().to_string();
    }
    if let Some(category) = req.category {
        blog.category = category.trim().to_string();
    }
    if let Some(tags) = req.tags {
        blog.tags = clean_tags(tags);
    }
    if let Some(image_url) = req.image_url {
        blog.image_url = Some(image_url).filter(|u| !u.trim().is_empty());
    }
    if let Some(read_time) = req.read_time.filter(|r| !r.trim().is_empty()) {
        blog.read_time = read_time;
    }
    let now = chrono::Utc::now();
    blog.date = now.format("%Y-%m-%d").to_string();
    blog.updated_at = now.to_rfc3339();

    store.put_blog(&blog).await?;
    tracing::info!(blog_id, admin = %session.user_id, "Blog updated");
    Ok(blog)
}

pub async fn delete_blog(store: &dyn Store, session: &Session, blog_id: &str) -> Result<()> {
    session.require_admin()?;
    store.delete_blog(blog_id).await?;
    tracing::info!(blog_id, admin = %session.user_id, "Blog deleted");
    Ok(())
}
