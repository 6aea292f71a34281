use serde::Serialize;

/// Name given to the lazily created subscription before the first checkout.
pub const FREE_PLAN_NAME: &str = "Free";

/// Plan name stored when Stripe's price carries no nickname.
pub const DEFAULT_PAID_PLAN_NAME: &str = "Pro";

/// Usage limits attached to a plan. `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub users: i64,
    pub api_calls: i64,
    pub storage_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: &'static str,
    pub slug: &'static str,
    /// Minor currency units per month.
    pub price: i64,
    /// Empty for the free plan.
    pub stripe_price_id: String,
    pub features: Vec<&'static str>,
    pub limits: PlanLimits,
}

const GIB: i64 = 1024 * 1024 * 1024;

/// The plans offered on the billing page.
pub fn catalog(pro_price_id: &str, business_price_id: &str) -> Vec<Plan> {
    vec![
        Plan {
            name: FREE_PLAN_NAME,
            slug: "free",
            price: 0,
            stripe_price_id: String::new(),
            features: vec![
                "1 User",
                "100 API calls/month",
                "1GB Storage",
                "Basic Support",
                "Community Access",
            ],
            limits: PlanLimits {
                users: 1,
                api_calls: 100,
                storage_bytes: GIB,
            },
        },
        Plan {
            name: "Pro",
            slug: "pro",
            price: 1900,
            stripe_price_id: pro_price_id.to_string(),
            features: vec![
                "5 Users",
                "10,000 API calls/month",
                "10GB Storage",
                "Priority Support",
                "Advanced Analytics",
                "API Access",
            ],
            limits: PlanLimits {
                users: 5,
                api_calls: 10_000,
                storage_bytes: 10 * GIB,
            },
        },
        Plan {
            name: "Business",
            slug: "business",
            price: 4900,
            stripe_price_id: business_price_id.to_string(),
            features: vec![
                "Unlimited Users",
                "Unlimited API calls",
                "100GB Storage",
                "Premium Support",
                "Advanced Analytics",
                "API Access",
                "Custom Integrations",
                "SSO/SAML",
            ],
            limits: PlanLimits {
                users: -1,
                api_calls: -1,
                storage_bytes: 100 * GIB,
            },
        },
    ]
}
