use actix_web::HttpResponse;
use askama::Template;

/// Renders a page template; a render failure is a plain 500 after
/// logging which template broke.
pub fn render<T: Template>(template: T) -> HttpResponse {
    match template.render() {
        Ok(html) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(html),
        Err(err) => {
            log::error!("Failed to render {}: {err}", std::any::type_name::<T>());
            HttpResponse::InternalServerError().finish()
        }
    }
}
