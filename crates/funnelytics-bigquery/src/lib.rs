pub mod params;
pub mod queries;

pub use params::{bind_named_params, referenced_placeholders, BoundParam};
pub use queries::ab_test::{render_arm_assignment_sql, render_funnel_by_arm_sql};
pub use queries::funnel::{
    render_funnel_counts_sql, render_funnel_membership_sql, RenderedQuery,
};
