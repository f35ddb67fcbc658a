use actix_web::web;

use crate::api::{agent, attendance, auth, incidents, notifications, verification};

pub fn configure(cfg: &mut web::ServiceConfig, api_prefix: &str) {
    cfg.service(web::resource("/health").route(web::get().to(agent::health)));

    cfg.service(
        web::scope(api_prefix)
            // /auth/login
            .service(web::resource("/auth/login").route(web::post().to(auth::login)))
            // /connectivity
            .service(web::resource("/connectivity").route(web::put().to(agent::set_connectivity)))
            // /sync
            .service(web::resource("/sync").route(web::post().to(agent::sync_now)))
            // /queue
            .service(web::resource("/queue").route(web::get().to(agent::list_queue)))
            // /incidents
            .service(web::resource("/incidents").route(web::post().to(incidents::create_incident)))
            .service(
                web::scope("/notifications")
                    // /notifications
                    .service(
                        web::resource("")
                            .route(web::post().to(notifications::create_notification)),
                    )
                    // /notifications/{id}/read
                    .service(
                        web::resource("/{id}/read").route(web::put().to(notifications::mark_read)),
                    )
                    // /notifications/{employee_id} (GET) and /notifications/{id} (DELETE)
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(notifications::list_notifications))
                            .route(web::delete().to(notifications::dismiss)),
                    ),
            )
            .service(
                web::scope("/verification")
                    // /verification
                    .service(
                        web::resource("")
                            .route(web::get().to(verification::status))
                            .route(web::delete().to(verification::close)),
                    )
                    // /verification/scan
                    .service(web::resource("/scan").route(web::post().to(verification::scan)))
                    // /verification/frame
                    .service(
                        web::resource("/frame").route(web::put().to(verification::push_frame)),
                    )
                    // /verification/location
                    .service(
                        web::resource("/location")
                            .route(web::put().to(verification::report_location)),
                    )
                    // /verification/{employee_id}
                    .service(
                        web::resource("/{employee_id}").route(web::post().to(verification::open)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // /attendance/{employee_id}/history
                    .service(
                        web::resource("/{employee_id}/history")
                            .route(web::get().to(attendance::history)),
                    )
                    // /attendance/{employee_id}/refresh
                    .service(
                        web::resource("/{employee_id}/refresh")
                            .route(web::post().to(attendance::refresh)),
                    ),
            ),
    );
}
