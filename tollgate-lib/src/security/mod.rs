pub mod block_list;
pub mod identity;
pub mod rate_limit;

pub use block_list::{
    is_ip_allowed, manual_block_action, BlockAck, BlockAction, BlockActionError, BlockList,
    IpFilterBlockList, NoBlockList,
};
pub use identity::{
    extract_credential, Identity, IdentityError, IdentityVerifier, JwtVerifier, Role,
};
pub use rate_limit::{
    extract_client_ip, EffectiveLimit, RateDecision, RateLimitManager, RateLimitResult, RequestMeta,
    RouteClass,
};
