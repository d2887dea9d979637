use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::{
    config::AppConfig,
    database::{
        RedisDatabase,
        channel::{DynChannelRepository, LocalChannelRepository, RedisChannelRepository},
        visit::{DynVisitRepository, LocalVisitRepository, RedisVisitRepository},
        watch::{DynWatchRepository, LocalWatchRepository, RedisWatchRepository},
    },
    server::utils::signature_utils::SignatureUtil,
};

use super::{
    channel_services::{ChannelsService, DynChannelsService},
    rate_limit_services::{DynRateLimitService, EdgeRateLimitService, LocalRateLimitService},
    visit_services::{DynVisitService, VisitService},
    watch_services::{DynWatchService, WatchService},
};

/// edge services without a relational database
/// redis (or valkey) is the shared store, without it everything falls back to process memory
#[derive(Clone)]
pub struct EdgeServices {
    pub signature_util: Arc<SignatureUtil>,
    pub channels: DynChannelsService,
    pub watch: DynWatchService,
    pub visits: DynVisitService,
    pub rate_limit: DynRateLimitService,
    /// upstream client for the relay, no overall timeout so long streams aren't cut off
    pub relay_http: reqwest::Client,
    pub redis: Option<Arc<RedisDatabase>>,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub fn new(redis_db: Option<RedisDatabase>, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        info!("starting edge services...");

        let signature_util = Arc::new(SignatureUtil::new(config.access_token_secret.clone()));

        let relay_http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.relay_connect_timeout_secs))
            // the client picks the encoding, we relay bytes as they come
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()?;

        info!("signature util and relay client ok, starting remaining services...");

        let redis = redis_db.map(Arc::new);
        let local_channels = Arc::new(LocalChannelRepository::new()) as DynChannelRepository;

        let (channels, watch, visits, rate_limit) = match &redis {
            Some(redis) => {
                let primary_channels =
                    Arc::new(RedisChannelRepository::new(redis.clone())) as DynChannelRepository;
                let watch_repository =
                    Arc::new(RedisWatchRepository::new(redis.clone())) as DynWatchRepository;
                let visit_repository =
                    Arc::new(RedisVisitRepository::new(redis.clone())) as DynVisitRepository;

                (
                    Arc::new(ChannelsService::new(Some(primary_channels), local_channels))
                        as DynChannelsService,
                    Arc::new(WatchService::new(watch_repository)) as DynWatchService,
                    Arc::new(VisitService::new(visit_repository)) as DynVisitService,
                    Arc::new(EdgeRateLimitService::new(redis.clone())) as DynRateLimitService,
                )
            }
            None => {
                warn!("no redis, channels, progress, visits and rate limits are process local");

                (
                    Arc::new(ChannelsService::new(None, local_channels)) as DynChannelsService,
                    Arc::new(WatchService::new(Arc::new(LocalWatchRepository::new())))
                        as DynWatchService,
                    Arc::new(VisitService::new(Arc::new(LocalVisitRepository::new())))
                        as DynVisitService,
                    Arc::new(LocalRateLimitService::default()) as DynRateLimitService,
                )
            }
        };

        Ok(Self {
            signature_util,
            channels,
            watch,
            visits,
            rate_limit,
            relay_http,
            redis,
            config,
        })
    }
}
