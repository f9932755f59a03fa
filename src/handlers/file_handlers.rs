//! HTTP handlers for uploading, listing, retrieving and deleting files.
//! Uploads are spooled to a temporary file so the backend receives a
//! known-length body; downloads stream straight from the backend.

use crate::{
    backend::ObjectBody,
    config::parse_flag,
    errors::AppError,
    models::{
        envelope::Envelope,
        file::FileDescriptor,
        object::{DEFAULT_CONTENT_TYPE, base_name},
    },
    services::{
        gateway::{GatewayError, StorageGateway},
        naming::UPLOAD_PREFIX,
    },
};
use axum::{
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetFileQuery {
    pub download: Option<String>,
}

/// An uploaded file parked on local disk. The file is removed when this
/// value is dropped.
struct SpooledUpload {
    path: TempPath,
    file_name: String,
    content_type: String,
    size: u64,
    digest: md5::Digest,
}

/// `POST /upload` — store the multipart field `file` under a derived key.
pub async fn upload_file(
    State(gateway): State<StorageGateway>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Envelope<FileDescriptor>, AppError> {
    let mut multipart = multipart.map_err(|rejection| {
        AppError::new(
            rejection.status(),
            format!("Error retrieving file: {}", rejection.body_text()),
        )
    })?;
    let spool_dir = gateway.policy().spool_dir.as_deref();
    let upload = spool_file_field(&mut multipart, spool_dir).await?;

    let uploaded_at = Utc::now();
    let key = gateway.derive_object_key(&upload.file_name, uploaded_at, &upload.digest);
    let object = gateway
        .put_object(
            &key,
            upload.size,
            ObjectBody::File(upload.path.to_path_buf()),
            &upload.content_type,
        )
        .await
        .map_err(|err| AppError::from_gateway("Error uploading file", err))?;

    // The object is stored at this point; a missing link must not fail the upload.
    let url = match gateway
        .presigned_url(&key, gateway.policy().upload_url_expiry)
        .await
    {
        Ok(url) => Some(url),
        Err(err) => {
            warn!(key = %key, "Failed to generate presigned URL: {}", err);
            None
        }
    };

    info!(key = %key, size = object.size, "File uploaded");
    Ok(Envelope::ok(
        "File uploaded successfully",
        FileDescriptor {
            file_name: upload.file_name,
            size: object.size,
            content_type: upload.content_type,
            url,
            uploaded_at,
        },
    ))
}

/// Find the `file` field and copy it into a temporary file, hashing and
/// counting bytes on the way.
async fn spool_file_field(
    multipart: &mut Multipart,
    spool_dir: Option<&std::path::Path>,
) -> Result<SpooledUpload, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(FILE_FIELD) {
            return spool_field(field, spool_dir).await;
        }
    }
    Err(AppError::bad_request(format!(
        "Error retrieving file: no `{}` field in form",
        FILE_FIELD
    )))
}

async fn spool_field(
    mut field: Field<'_>,
    spool_dir: Option<&std::path::Path>,
) -> Result<SpooledUpload, AppError> {
    let file_name = field
        .file_name()
        .map(base_name)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::bad_request(format!(
                "Error retrieving file: field `{}` has no file name",
                FILE_FIELD
            ))
        })?;
    let content_type = field
        .content_type()
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let suffix = std::path::Path::new(&file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    let mut builder = tempfile::Builder::new();
    builder.prefix("upload-").suffix(&suffix);
    let spooled = match spool_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    let (std_file, path) = spooled
        .map_err(|err| AppError::internal(format!("Error creating temporary file: {}", err)))?
        .into_parts();
    let mut file = tokio::fs::File::from_std(std_file);

    let mut digest = md5::Context::new();
    let mut size: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        digest.consume(&chunk);
        size += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|err| AppError::internal(format!("Error saving temporary file: {}", err)))?;
    }
    file.flush()
        .await
        .map_err(|err| AppError::internal(format!("Error saving temporary file: {}", err)))?;

    Ok(SpooledUpload {
        path,
        file_name,
        content_type,
        size,
        digest: digest.compute(),
    })
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(
        err.status(),
        format!("Error retrieving file: {}", err.body_text()),
    )
}

/// `GET /files?prefix=` — list files with fresh share links.
pub async fn list_files(
    State(gateway): State<StorageGateway>,
    Query(q): Query<ListFilesQuery>,
) -> Result<Envelope<Vec<FileDescriptor>>, AppError> {
    let prefix = q
        .prefix
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| UPLOAD_PREFIX.to_string());

    let objects = gateway
        .list_objects(&prefix)
        .await
        .map_err(|err| AppError::from_gateway("Error listing files", err))?;

    // A link that cannot be minted is left out; the entry itself stays.
    let expiry = gateway.policy().upload_url_expiry;
    let urls = futures::future::join_all(objects.iter().map(|object| {
        let gateway = &gateway;
        async move {
            match gateway.presigned_url(&object.key, expiry).await {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!(key = %object.key, "Failed to generate presigned URL: {}", err);
                    None
                }
            }
        }
    }))
    .await;

    let now = Utc::now();
    let files: Vec<FileDescriptor> = objects
        .iter()
        .zip(urls)
        .map(|(object, url)| FileDescriptor::from_object(object, url, now))
        .collect();

    Ok(Envelope::ok(format!("Found {} files", files.len()), files))
}

/// `GET /files/` — the key is missing.
pub async fn missing_key() -> AppError {
    AppError::bad_request("Object name is required")
}

/// `GET /files/{*key}` — redirect to a short-lived link, or send the bytes
/// as an attachment when `download` is truthy.
pub async fn get_file(
    State(gateway): State<StorageGateway>,
    Path(key): Path<String>,
    Query(q): Query<GetFileQuery>,
) -> Result<Response, AppError> {
    if key.is_empty() {
        return Err(AppError::bad_request("Object name is required"));
    }

    match gateway.object_exists(&key).await {
        Ok(true) => {}
        Ok(false) => return Err(AppError::not_found("File not found")),
        Err(GatewayError::InvalidKey) => return Err(AppError::bad_request("Invalid object name")),
        Err(err) => return Err(AppError::from_gateway("Error checking object", err)),
    }

    let download = q.download.as_deref().and_then(parse_flag).unwrap_or(false);
    if download {
        return download_response(&gateway, &key).await;
    }

    let url = gateway
        .presigned_url(&key, gateway.policy().retrieve_url_expiry)
        .await
        .map_err(|err| AppError::from_gateway("Error generating URL", err))?;
    let location = HeaderValue::from_str(&url)
        .map_err(|err| AppError::internal(format!("Error generating URL: {}", err)))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

async fn download_response(gateway: &StorageGateway, key: &str) -> Result<Response, AppError> {
    let download_err = |err| AppError::from_gateway("Error downloading file", err);
    let stream = gateway.get_object_stream(key).await.map_err(download_err)?;

    let content_length = stream.content_length;
    let (body, length) = match content_length {
        Some(length) => (Body::from_stream(ReaderStream::new(stream.reader)), length),
        None => {
            // Length unknown up front: read the whole object to announce it.
            drop(stream);
            let bytes = gateway.get_object_bytes(key).await.map_err(download_err)?;
            let length = bytes.len() as u64;
            (Body::from(bytes), length)
        }
    };

    let mut response = Response::new(body);
    set_attachment_headers(response.headers_mut(), base_name(key), length);
    Ok(response)
}

fn set_attachment_headers(headers: &mut HeaderMap, file_name: &str, length: u64) {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_name.replace(['"', '\\'], "_")
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
}

/// `DELETE /files/{*key}` — remove a file; removing a missing file succeeds.
pub async fn delete_file(
    State(gateway): State<StorageGateway>,
    Path(key): Path<String>,
) -> Result<Envelope<()>, AppError> {
    gateway
        .delete_object(&key)
        .await
        .map_err(|err| AppError::from_gateway("Error deleting file", err))?;

    Ok(Envelope::ok_empty(StatusCode::OK, "File deleted successfully"))
}
