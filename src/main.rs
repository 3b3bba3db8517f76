use std::{process::exit, sync::Arc};

use pingora::services::listening::Service;
use pingora_core::{
    listeners::tls::TlsSettings,
    server::{configuration::Opt, Server},
};

use fragway::{
    config::Config,
    core::status,
    handlers::HandlerRegistry,
    logging::Logger,
    orchestration::RequestPipeline,
    service::{GatewayHttpApp, StatusHttpApp},
};

fn main() {
    // Load configuration and command-line arguments
    let opt = Opt::parse_args();
    let config = match Config::load_yaml_with_opt_override(&opt) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            exit(1);
        }
    };

    // Initialize logging
    let logger = if let Some(log_cfg) = &config.log {
        let logger = Logger::new(log_cfg.clone());
        logger.init_env_logger();
        Some(logger)
    } else {
        env_logger::init();
        None
    };

    // Unknown handlers or bad handler configs abort before serving traffic
    log::info!("Initializing handlers...");
    let pipeline = match RequestPipeline::from_config(&config, &HandlerRegistry::builtin()) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            log::error!("Failed to initialize request pipeline: {e}");
            exit(1);
        }
    };
    status::mark_ready(pipeline.operations());

    let mut fragway_server = Server::new_with_opt_and_conf(Some(opt), config.pingora);

    if let Some(log_service) = logger {
        log::info!("Adding log sync service...");
        fragway_server.add_service(log_service);
    }

    let mut http_service = GatewayHttpApp::gateway_http_service(pipeline.clone());

    log::info!("Adding listeners...");
    for list_cfg in config.listeners.iter() {
        let address = list_cfg.address.to_string();
        match &list_cfg.tls {
            Some(tls) => {
                let mut settings = match TlsSettings::intermediate(&tls.cert_path, &tls.key_path) {
                    Ok(settings) => settings,
                    Err(e) => {
                        log::error!("Failed to load TLS settings for {address}: {e}");
                        exit(1);
                    }
                };
                if list_cfg.offer_h2 {
                    settings.enable_h2();
                }
                http_service.add_tls_with_settings(&address, None, settings);
            }
            None => http_service.add_tcp(&address),
        }
    }

    if let Some(status_cfg) = &config.status {
        log::info!("Adding Status HTTP...");
        let status_service =
            StatusHttpApp::status_http_service(status_cfg, pipeline.admission().clone());
        fragway_server.add_service(status_service);
    }

    if let Some(prometheus_cfg) = &config.prometheus {
        log::info!("Adding Prometheus HTTP...");
        let mut prometheus_service_http = Service::prometheus_http_service();
        prometheus_service_http.add_tcp(&prometheus_cfg.address.to_string());
        fragway_server.add_service(prometheus_service_http);
    }

    log::info!("Bootstrapping...");
    fragway_server.bootstrap();

    log::info!("Bootstrapped. Adding Services...");
    fragway_server.add_service(http_service);

    log::info!("Starting Server...");
    fragway_server.run_forever();
}
