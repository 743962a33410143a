use std::fmt;
use std::time::Duration;

use crate::config::GuardConfig;
use crate::observability::audit::AuditLogger;
use crate::pipeline::stage::Stage;
use crate::pipeline::stages::{
    AuditStage, BodyStage, BruteForceStage, ContentTypeStage, HoneypotStage, ScannerStage,
    SecondPassStage, TaggingStage, TransportStage, UploadStage,
};
use crate::security::honeypot::Honeypot;
use crate::security::origin::OriginValidator;
use crate::security::scanner::ThreatScanner;

/// The composed chain. Built once at startup and shared.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    trust_proxy: bool,
    audit: AuditLogger,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn trust_proxy(&self) -> bool {
        self.trust_proxy
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("trust_proxy", &self.trust_proxy)
            .finish()
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
    trust_proxy: bool,
    audit: AuditLogger,
}

impl PipelineBuilder {
    /// The fixed ten-stage chain described by `config`.
    pub fn from_config(config: &GuardConfig, audit: AuditLogger) -> Self {
        let environment = config.environment;
        let scanner = &config.scanner;

        Self::default()
            .audit(audit.clone())
            .trust_proxy(config.listener.trust_proxy)
            .stage(TransportStage {
                validator: OriginValidator::from_config(&config.cors, environment),
                production: config.is_production(),
                preflight_max_age_secs: config.cors.preflight_max_age_secs,
                audit: audit.clone(),
            })
            .stage(BodyStage {
                max_body_bytes: config.limits.max_body_bytes,
            })
            .stage(ScannerStage {
                scanner: ThreatScanner::full(scanner.max_depth)
                    .with_exempt_paths(scanner.exempt_paths.iter().cloned()),
                audit: audit.clone(),
            })
            .stage(AuditStage {
                audit: audit.clone(),
                slow_request: Duration::from_millis(config.observability.slow_request_ms),
            })
            .stage(TaggingStage)
            .stage(SecondPassStage {
                scanner: ThreatScanner::sql_nosql(scanner.max_depth)
                    .with_exempt_paths(scanner.second_pass_exempt_paths.iter().cloned()),
                audit: audit.clone(),
            })
            .stage(BruteForceStage)
            .stage(HoneypotStage {
                honeypot: Honeypot::new(&config.honeypot),
                audit: audit.clone(),
            })
            .stage(UploadStage {
                limits: config.limits.clone(),
                audit,
            })
            .stage(ContentTypeStage {
                allowed: config.limits.allowed_content_types.clone(),
            })
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            trust_proxy: self.trust_proxy,
            audit: self.audit,
        }
    }
}
