use actix_multipart::Multipart;
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{HttpRequest, Responder, web};
use futures::{StreamExt, TryStreamExt};

use crate::orchestrator::{
    BatchOrchestrator, FILE_FIELDS, FileField, MAX_FILES, PredictRequest, UploadedItem,
};

pub const FORWARDED_FOR: &str = "X-Forwarded-For";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/predict").route(web::post().to(predict)))
        .service(web::resource("/api/readyz").route(web::get().to(readyz)))
        .service(web::resource("/api/livez").route(web::get().to(livez)));
}

async fn predict(
    req: HttpRequest,
    payload: Multipart,
    orchestrator: web::Data<BatchOrchestrator>,
) -> impl Responder {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    let request = PredictRequest {
        forwarded_for: header(FORWARDED_FOR),
        peer_addr: req.peer_addr().map(|addr| addr.ip().to_string()),
        content_type: header(CONTENT_TYPE.as_str()),
        path: req.path().to_string(),
        method: req.method().to_string(),
        files: read_file_fields(payload).await,
    };
    log::info!(
        "Predict request with {} file part(s) from {:?}",
        request.files.len(),
        request.client_ip()
    );

    orchestrator.predict(request).await
}

async fn readyz(orchestrator: web::Data<BatchOrchestrator>) -> impl Responder {
    orchestrator.readyz()
}

async fn livez(orchestrator: web::Data<BatchOrchestrator>) -> impl Responder {
    orchestrator.livez()
}

/// Collects the file parts sent under an accepted field name, in arrival
/// order. Parts without a `filename` parameter are plain form values and are
/// skipped; at most `MAX_FILES` parts are buffered per field. A malformed
/// body ends decoding; parts read so far are kept.
async fn read_file_fields(mut payload: Multipart) -> Vec<FileField> {
    let mut files = Vec::new();
    let mut buffered = [0usize; FILE_FIELDS.len()];

    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Stopped reading multipart body: {}", e);
                break;
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let Some(slot) = FILE_FIELDS.iter().position(|accepted| *accepted == name) else {
            log::debug!("Skipping multipart field {:?}", name);
            continue;
        };

        let Some(filename) = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
        else {
            log::debug!("Skipping multipart field {:?} without a filename", name);
            continue;
        };

        if buffered[slot] >= MAX_FILES {
            log::debug!("Skipping extra file {:?} in field {:?}", filename, name);
            continue;
        }

        let mime_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            match chunk {
                Ok(data) => bytes.extend_from_slice(&data),
                Err(e) => {
                    log::warn!("Stopped reading multipart field {:?}: {}", name, e);
                    return files;
                }
            }
        }

        buffered[slot] += 1;
        files.push(FileField {
            field: name,
            item: UploadedItem {
                filename: Some(filename),
                bytes,
                mime_type,
            },
        });
    }

    files
}
