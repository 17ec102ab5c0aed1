//! Curated external links. Everyone reads, admins write.

use crate::error::{AppError, Result};
use crate::session::Session;
use crate::store::Store;
use crate::types::{CreateResourceRequest, Resource, ResourceType, UpdateResourceRequest};

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("title is required"));
    }
    Ok(title.to_string())
}

fn validate_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::validation("url is required"));
    }
    let parsed = url::Url::parse(raw).map_err(|e| AppError::validation(format!("url is invalid: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(AppError::validation(format!("url scheme {} is not allowed", other))),
    }
}

pub async fn list_resources(store: &dyn Store) -> Result<Vec<Resource>> {
    let mut resources = store.list_resources().await?;
    resources.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
    Ok(resources)
}

pub async fn get_resource(store: &dyn Store, resource_id: &str) -> Result<Resource> {
    store
        .get_resource(resource_id)
        .await?
        .ok_or_else(|| AppError::not_found("resource", resource_id))
}

pub async fn create_resource(store: &dyn Store, session: &Session, req: CreateResourceRequest) -> Result<Resource> {
    session.require_admin()?;
    let resource = Resource {
        resource_id: uuid::Uuid::new_v4().to_string(),
        title: validate_title(&req.title)?,
        url: validate_url(&req.url)?,
        description: req.description.trim().to_string(),
        resource_type: req
            .resource_type
            .ok_or_else(|| AppError::validation(format!(
                "type is required, one of {}, {}, {}",
                ResourceType::Pdf.as_str(),
                ResourceType::Video.as_str(),
                ResourceType::Link.as_str()
            )))?,
    };
    store.put_resource(&resource).await?;
    tracing::info!(resource_id = %resource.resource_id, admin = %session.user_id, "Resource added");
    Ok(resource)
}

pub async fn update_resource(
    store: &dyn Store,
    session: &Session,
    resource_id: &str,
    req: UpdateResourceRequest,
) -> Result<Resource> {
    session.require_admin()?;
    let mut resource = get_resource(store, resource_id).await?;
    if let Some(title) = req.title {
        resource.title = validate_title(&title)?;
    }
    if let Some(url) = req.url {
        resource.url = validate_url(&url)?;
    }
    if let Some(description) = req.description {
        resource.description = description.trim().to_string();
    }
    if let Some(resource_type) = req.resource_type {
        resource.resource_type = resource_type;
    }
    store.put_resource(&resource).await?;
    tracing::info!(resource_id, admin = %session.user_id, "Resource updated");
    Ok(resource)
}

pub async fn delete_resource(store: &dyn Store, session: &Session, resource_id: &str) -> Result<()> {
    session.require_admin()?;
    store.delete_resource(resource_id).await?;
    tracing::info!(resource_id, admin = %session.user_id, "Resource deleted");
    Ok(())
}
