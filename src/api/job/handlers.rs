use actix_web::{
    get,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    post,
    web::{Data, Path, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;

use super::dto::{JobListResponse, VideoResponse};
use super::models::VideoRequest;
use super::service::{JobService, ServiceError};
use crate::jobs::JobId;

#[post("/api/generate")]
async fn create_video(
    service: Data<JobService>,
    request: Json<VideoRequest>,
) -> Result<HttpResponse, ServiceError> {
    let job = service.create_job(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(VideoResponse::from(&job)))
}

#[get("/api/status/{video_id}")]
async fn video_status(
    service: Data<JobService>,
    path: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let job = service.get_job(&JobId::from(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(VideoResponse::from(&job)))
}

#[get("/api/jobs")]
async fn list_jobs(service: Data<JobService>) -> HttpResponse {
    let jobs: Vec<VideoResponse> = service.list_jobs().await.iter().map(VideoResponse::from).collect();
    HttpResponse::Ok().json(JobListResponse {
        count: jobs.len(),
        jobs,
    })
}

#[get("/download/{video_id}")]
async fn download_video(
    service: Data<JobService>,
    path: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let job_id = JobId::from(path.into_inner());
    let artifact = service.artifact(&job_id).await?;
    let bytes = tokio::fs::read(&artifact.path).await?;

    Ok(HttpResponse::Ok()
        .content_type("video/mp4")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(format!("videogen_ai_{}.mp4", job_id))],
        })
        .body(bytes))
}

pub fn job_config(config: &mut ServiceConfig) {
    config
        .service(create_video)
        .service(video_status)
        .service(list_jobs)
        .service(download_video);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::validation;
    use crate::events::ObserverHub;
    use crate::jobs::JobRegistry;
    use crate::pipeline::{Pipeline, PipelineExecutor};
    use crate::render::SimulatedRenderer;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;
    use std::time::Duration;

    fn service(output: &std::path::Path) -> Data<JobService> {
        let registry = Arc::new(JobRegistry::new());
        let hub = Arc::new(ObserverHub::default());
        let executor = Arc::new(PipelineExecutor::new(
            registry.clone(),
            hub.clone(),
            Arc::new(SimulatedRenderer::new(output.to_path_buf(), 1, 0.0)),
            Pipeline::video_generation(0.0).unwrap(),
            Duration::from_millis(100),
        ));
        Data::new(JobService::new(registry, hub, executor))
    }

    #[actix_web::test]
    async fn generate_then_poll_status() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(service.clone())
                .app_data(validation::json_config())
                .configure(job_config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(serde_json::json!({"text": "Hello world. Second slide.", "duration": 20}))
            .to_request();
        let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["status"], "queued");
        assert_eq!(created["progress"], 0);
        assert_eq!(created["currentStep"], "Starting...");
        let id = created["videoId"].as_str().unwrap().to_string();

        for handle in service.drain_in_flight().await {
            handle.await.unwrap();
        }

        let req = test::TestRequest::get().uri(&format!("/api/status/{}", id)).to_request();
        let status: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status["status"], "completed");
        assert_eq!(status["progress"], 100);
        assert_eq!(status["videoUrl"], format!("/download/{}", id));
        assert_eq!(status["duration"], 20);

        let req = test::TestRequest::get().uri(&format!("/download/{}", id)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "video/mp4");

        let req = test::TestRequest::get().uri("/api/jobs").to_request();
        let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(list["count"], 1);
    }

    #[actix_web::test]
    async fn invalid_request_is_rejected_before_job_creation() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(service.clone())
                .app_data(validation::json_config())
                .configure(job_config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(serde_json::json!({"text": "Hi", "duration": 500}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Validation failed");
        assert!(body["fields"]["duration"]["errors"].is_array());
        assert!(service.list_jobs().await.is_empty());
    }

    #[actix_web::test]
    async fn unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(service(dir.path())).configure(job_config)).await;

        let req = test::TestRequest::get().uri("/api/status/nope").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/download/nope").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
