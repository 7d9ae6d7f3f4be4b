use std::future::{ready, Ready};

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error, HttpMessage, HttpResponse};
use futures_util::future::LocalBoxFuture;

use crate::handlers::ErrorResponse;
use crate::utils::auth::{decode_jwt, TokenError};
use crate::utils::config::Config;

pub use crate::utils::auth::Claims;

/// Requires `Authorization: Bearer <jwt>` and makes the token's [`Claims`]
/// available to handlers through `web::ReqData<Claims>`.
pub struct JwtMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = JwtMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareService { service }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authenticate(&req) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(message) => {
                log::warn!("🔒 Rejected {} {}: {}", req.method(), req.path(), message);
                let response = req
                    .into_response(HttpResponse::Unauthorized().json(ErrorResponse {
                        error: message.to_string(),
                    }))
                    .map_into_right_body();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

fn authenticate(req: &ServiceRequest) -> Result<Claims, &'static str> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or("Authentication is not configured")?;

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or("Missing authorization header")?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or("Invalid authorization format")?;

    decode_jwt(token, &config.jwt_secret).map_err(TokenError::message)
}
