use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub rides_created_total: IntCounterVec,
    pub match_queries_total: IntCounterVec,
    pub match_scan_seconds: Histogram,
    pub match_decisions_total: IntCounterVec,
    pub otp_verifications_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rides_created_total = IntCounterVec::new(
            Opts::new("rides_created_total", "Rides created by kind"),
            &["kind"],
        )
        .expect("valid rides_created_total metric");

        let match_queries_total = IntCounterVec::new(
            Opts::new("match_queries_total", "Candidate searches by outcome"),
            &["outcome"],
        )
        .expect("valid match_queries_total metric");

        let match_scan_seconds = Histogram::with_opts(HistogramOpts::new(
            "match_scan_seconds",
            "Time spent scanning and scoring host routes per search",
        ))
        .expect("valid match_scan_seconds metric");

        let match_decisions_total = IntCounterVec::new(
            Opts::new("match_decisions_total", "Host decisions on pending matches"),
            &["decision"],
        )
        .expect("valid match_decisions_total metric");

        let otp_verifications_total = IntCounterVec::new(
            Opts::new("otp_verifications_total", "Pickup OTP checks by outcome"),
            &["outcome"],
        )
        .expect("valid otp_verifications_total metric");

        registry
            .register(Box::new(rides_created_total.clone()))
            .expect("register rides_created_total");
        registry
            .register(Box::new(match_queries_total.clone()))
            .expect("register match_queries_total");
        registry
            .register(Box::new(match_scan_seconds.clone()))
            .expect("register match_scan_seconds");
        registry
            .register(Box::new(match_decisions_total.clone()))
            .expect("register match_decisions_total");
        registry
            .register(Box::new(otp_verifications_total.clone()))
            .expect("register otp_verifications_total");

        Self {
            registry,
            rides_created_total,
            match_queries_total,
            match_scan_seconds,
            match_decisions_total,
            otp_verifications_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
