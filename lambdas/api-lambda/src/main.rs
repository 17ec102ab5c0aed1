use lambda_http::{run, service_fn, tracing, Error, Request};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;
use unilearn_shared::{
    auth::CognitoIdentity, config::Config, media::S3MediaHost, store::DynamoStore,
    youtube::YouTubeClient, AppState,
};

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;

    // Initialize AWS clients once at startup
    let aws = aws_config::load_from_env().await;

    let store = Arc::new(DynamoStore::new(DynamoClient::new(&aws), &config.table_name));
    let identity = Arc::new(CognitoIdentity::new(
        CognitoClient::new(&aws),
        &config.cognito_user_pool_id,
        &config.cognito_client_id,
        &config.cognito_client_secret,
    ));
    let media = Arc::new(S3MediaHost::new(
        S3Client::new(&aws),
        &config.media_bucket,
        &config.media_public_base_url,
    ));
    let videos = Arc::new(YouTubeClient::new(&config.youtube_api_key, &config.youtube_api_base));

    tracing::info!(table = %config.table_name, bucket = %config.media_bucket, "Cold start complete");
    let state = AppState::new(config, store, identity, media, videos);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
