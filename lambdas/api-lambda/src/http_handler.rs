use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use unilearn_shared::{
    auth, blogs, catalog, enrollment, ingestion, media, progress, resources, users,
    error::AppError,
    progress::ProgressStatus,
    session::Session,
    store::UserStore,
    types::{
        AddTopicsRequest, CompletionRequest, CreateBlogRequest, CreateCourseRequest,
        CreateResourceRequest, ProfileInput, Role, UpdateBlogRequest, UpdateCourseRequest,
        UpdateResourceRequest, UpdateRoleRequest, Year,
    },
    AppState,
};

/// Status plus JSON body of a successful call
struct Reply {
    status: StatusCode,
    body: Option<serde_json::Value>,
}

impl Reply {
    fn with<T: Serialize>(status: StatusCode, value: &T) -> Result<Reply, AppError> {
        let body = serde_json::to_value(value)
            .map_err(|e| AppError::Internal(format!("failed to encode response: {}", e)))?;
        Ok(Reply {
            status,
            body: Some(body),
        })
    }

    fn ok<T: Serialize>(value: &T) -> Result<Reply, AppError> {
        Self::with(StatusCode::OK, value)
    }

    fn created<T: Serialize>(value: &T) -> Result<Reply, AppError> {
        Self::with(StatusCode::CREATED, value)
    }

    fn no_content() -> Result<Reply, AppError> {
        Ok(Reply {
            status: StatusCode::NO_CONTENT,
            body: None,
        })
    }
}

/// Main Lambda handler. Domain failures become JSON error responses; only a
/// response that cannot be built at all escapes as a Lambda error.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    tracing::info!(%method, %path, "Request received");

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header(
                "Access-Control-Allow-Methods",
                "GET,POST,PUT,PATCH,DELETE,OPTIONS",
            )
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type,Authorization,X-User-Id",
            )
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    match route(&event, &state).await {
        Ok(reply) => {
            let builder = Response::builder()
                .status(reply.status)
                .header("Access-Control-Allow-Origin", "*");
            let response = match reply.body {
                Some(body) => builder
                    .header("Content-Type", "application/json")
                    .body(body.to_string().into()),
                None => builder.body(Body::Empty),
            };
            Ok(response.map_err(Box::new)?)
        }
        Err(err) => error_response(&method, &path, &err),
    }
}

fn error_response(method: &Method, path: &str, err: &AppError) -> Result<Response<Body>, Error> {
    let status = err.status_code();
    if status >= 500 {
        tracing::error!(%method, path, kind = err.kind(), "Request failed: {}", err);
    } else {
        tracing::warn!(%method, path, kind = err.kind(), "Request rejected: {}", err);
    }
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&err.to_error_response())?.into())
        .map_err(Box::new)?)
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::validation(format!("Invalid request body: {}", e)))
}

fn query<'a>(event: &'a Request, key: &str) -> Option<&'a str> {
    event
        .query_string_parameters_ref()
        .and_then(|params| params.first(key))
        .filter(|v| !v.is_empty())
}

/// Caller identity from the API Gateway JWT authorizer. The `X-User-Id` header
/// is honoured only when explicitly enabled for local development.
fn caller_id(event: &Request, allow_header: bool) -> Option<String> {
    let from_header = if allow_header {
        event
            .headers()
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    } else {
        None
    };
    from_header.or_else(|| {
        event
            .request_context_ref()
            .and_then(|ctx| ctx.authorizer())
            .and_then(|auth| auth.jwt.as_ref())
            .and_then(|jwt| jwt.claims.get("sub"))
            .map(|s| s.to_string())
    })
}

async fn resolve_session(event: &Request, state: &AppState) -> Result<Session, AppError> {
    let user_id = caller_id(event, state.config.allow_user_id_header).ok_or(AppError::Authentication)?;
    // Role comes from our own record, never from client input.
    let role = state
        .store
        .get_user(&user_id)
        .await?
        .map(|u| u.role)
        .unwrap_or_default();
    Ok(Session::new(user_id, role))
}

fn parse_role_filter(raw: Option<&str>) -> Result<Option<Role>, AppError> {
    match raw {
        None => Ok(None),
        Some("student") => Ok(Some(Role::Student)),
        Some("admin") => Ok(Some(Role::Admin)),
        Some(other) => Err(AppError::validation(format!("unknown role {}", other))),
    }
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<ProgressStatus>, AppError> {
    match raw {
        None | Some("all") => Ok(None),
        Some(value) => ProgressStatus::parse(value)
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("unknown status {}", value))),
    }
}

async fn route(event: &Request, state: &AppState) -> Result<Reply, AppError> {
    let method = event.method();
    let path = event.uri().path();
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let body: &[u8] = event.body();
    let store = state.store.as_ref();

    // --- PUBLIC ---
    match (method, parts.as_slice()) {
        (&Method::POST, ["login"]) => {
            return Reply::ok(&auth::login(state.identity.as_ref(), parse_body(body)?).await?);
        }
        (&Method::POST, ["signup"]) => {
            return Reply::created(&auth::signup(store, state.identity.as_ref(), parse_body(body)?).await?);
        }
        (&Method::POST, ["refresh"]) => {
            return Reply::ok(&auth::refresh(state.identity.as_ref(), parse_body(body)?).await?);
        }
        (&Method::POST, ["password", "forgot"]) => {
            auth::forgot_password(state.identity.as_ref(), parse_body(body)?).await?;
            return Reply::ok(&serde_json::json!({"message": "If the account exists, a reset code has been sent"}));
        }
        (&Method::POST, ["password", "reset"]) => {
            auth::reset_password(state.identity.as_ref(), parse_body(body)?).await?;
            return Reply::ok(&serde_json::json!({"message": "Password updated"}));
        }
        (&Method::GET, ["profile", "topics"]) => {
            let raw = query(event, "year").ok_or_else(|| AppError::validation("year is required"))?;
            let year: u8 = raw
                .parse()
                .map_err(|_| AppError::validation(format!("year must be a number, got {}", raw)))?;
            let year = Year::try_from(year)?;
            return Reply::ok(&serde_json::json!({
                "year": year,
                "topics": enrollment::topics_for_year(year),
            }));
        }
        (&Method::GET, ["blogs"]) => return Reply::ok(&blogs::list_blogs(store).await?),
        (&Method::GET, ["blogs", blog_id]) => return Reply::ok(&blogs::get_blog(store, blog_id).await?),
        (&Method::GET, ["resources"]) => return Reply::ok(&resources::list_resources(store).await?),
        (&Method::GET, ["resources", resource_id]) => {
            return Reply::ok(&resources::get_resource(store, resource_id).await?);
        }
        _ => {}
    }

    // All other routes require auth
    let session = resolve_session(event, state).await?;

    match (method, parts.as_slice()) {
        // --- USER & PROFILE ---
        (&Method::GET, ["users", "me"]) => Reply::ok(&users::get_me(store, &session).await?),
        (&Method::GET, ["profile"]) => Reply::ok(&enrollment::get_profile(store, &session).await?),
        (&Method::PUT, ["profile"]) => {
            let input: ProfileInput = parse_body(body)?;
            Reply::ok(&enrollment::complete_profile(store, &session, input).await?)
        }
        (&Method::POST, ["profile", "topics"]) => {
            let req: AddTopicsRequest = parse_body(body)?;
            Reply::ok(&enrollment::add_topics(store, &session, req.topics).await?)
        }
        (&Method::GET, ["profile", "state"]) => {
            Reply::ok(&enrollment::enrollment_state(store, &session).await?)
        }

        // --- COURSES & PROGRESS ---
        (&Method::GET, ["courses"]) => Reply::ok(&catalog::list_courses(store, &session).await?),
        (&Method::GET, ["courses", course_id]) => {
            Reply::ok(&catalog::get_course(store, &session, course_id).await?)
        }
        (&Method::PUT, ["courses", course_id, "lectures", lecture_id, "completion"]) => {
            let req: CompletionRequest = parse_body(body)?;
            Reply::ok(
                &progress::set_lecture_completion(store, &session, course_id, lecture_id, req.completed)
                    .await?,
            )
        }
        (&Method::GET, ["my", "courses"]) => {
            let status = parse_status_filter(query(event, "status"))?;
            Reply::ok(&catalog::list_enrolled_courses(store, &session, status).await?)
        }
        (&Method::GET, ["my", "summary"]) => {
            Reply::ok(&catalog::learning_summary(store, &session).await?)
        }

        // --- UPLOADS ---
        (&Method::POST, ["uploads", "images"]) => {
            let req: media::UploadImageRequest = parse_body(body)?;
            Reply::created(&media::upload_image(state.media.as_ref(), &session, req).await?)
        }

        // --- ADMIN ---
        (&Method::GET, ["admin", "users"]) => {
            let role = parse_role_filter(query(event, "role"))?;
            Reply::ok(&users::list_users(store, &session, role).await?)
        }
        (&Method::PATCH, ["admin", "users", user_id, "role"]) => {
            let req: UpdateRoleRequest = parse_body(body)?;
            Reply::ok(&users::set_role(store, &session, user_id, req.role).await?)
        }
        (&Method::POST, ["admin", "courses"]) => {
            session.require_admin()?;
            let req: CreateCourseRequest = parse_body(body)?;
            let course =
                ingestion::create_course_from_playlist(store, state.videos.as_ref(), &session, req).await?;
            Reply::created(&course)
        }
        (&Method::PATCH, ["admin", "courses", course_id]) => {
            session.require_admin()?;
            let req: UpdateCourseRequest = parse_body(body)?;
            Reply::ok(&catalog::update_course(store, &session, course_id, req).await?)
        }
        (&Method::DELETE, ["admin", "courses", course_id]) => {
            catalog::delete_course(store, &session, course_id).await?;
            Reply::no_content()
        }
        (&Method::POST, ["admin", "blogs"]) => {
            session.require_admin()?;
            let req: CreateBlogRequest = parse_body(body)?;
            Reply::created(&blogs::create_blog(store, &session, req).await?)
        }
        (&Method::PATCH, ["admin", "blogs", blog_id]) => {
            session.require_admin()?;
            let req: UpdateBlogRequest = parse_body(body)?;
            Reply::ok(&blogs::update_blog(store, &session, blog_id, req).await?)
        }
        (&Method::DELETE, ["admin", "blogs", blog_id]) => {
            blogs::delete_blog(store, &session, blog_id).await?;
            Reply::no_content()
        }
        (&Method::POST, ["admin", "resources"]) => {
            session.require_admin()?;
            let req: CreateResourceRequest = parse_body(body)?;
            Reply::created(&resources::create_resource(store, &session, req).await?)
        }
        (&Method::PATCH, ["admin", "resources", resource_id]) => {
            session.require_admin()?;
            let req: UpdateResourceRequest = parse_body(body)?;
            Reply::ok(&resources::update_resource(store, &session, resource_id, req).await?)
        }
        (&Method::DELETE, ["admin", "resources", resource_id]) => {
            resources::delete_resource(store, &session, resource_id).await?;
            Reply::no_content()
        }

        // No matching route
        _ => Err(AppError::not_found("route", format!("{} {}", method, path))),
    }
}
