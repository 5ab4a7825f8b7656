use aws_config::SdkConfig;
use aws_sdk_s3::Client;

/// Build an S3 client from a loaded SDK config.
pub fn build_client(config: &SdkConfig) -> Client {
    Client::new(config)
}
