//! Research-tool wiring: which env vars each tool needs inside the
//! sandbox, and the API blurb injected into prompts for each tool.

use std::collections::HashMap;

/// Env vars a research tool expects inside the executor container.
fn service_env_vars(service: &str) -> &'static [&'static str] {
    match service {
        "Twitter" => &[
            "TWITTER_API_KEY",
            "TWITTER_API_KEY_SECRET",
            "TWITTER_ACCESS_TOKEN",
            "TWITTER_ACCESS_TOKEN_SECRET",
            "TWITTER_BEARER_TOKEN",
        ],
        "CoinGecko" => &["COINGECKO_API_KEY"],
        "Etherscan" => &["ETHERSCAN_API_KEY"],
        "Infura" => &["INFURA_PROJECT_ID"],
        _ => &[],
    }
}

/// Collect the env map to inject into each sandbox run: every var the
/// selected tools need, valued from this process's environment (empty
/// when unset, so generated code fails with a readable error instead of a
/// missing key).
pub fn services_to_envs(services: &[String]) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for service in services {
        for var in service_env_vars(service) {
            env.insert(
                var.to_string(),
                std::env::var(var).unwrap_or_default(),
            );
        }
    }
    env
}

/// Prompt blurbs describing how generated code can call each tool.
pub fn services_to_prompts(services: &[String]) -> Vec<String> {
    services
        .iter()
        .filter_map(|service| match service.as_str() {
            "Twitter" => Some(
                "Twitter (env vars TWITTER_API_KEY, TWITTER_API_KEY_SECRET, \
                 TWITTER_BEARER_TOKEN, TWITTER_ACCESS_TOKEN, TWITTER_ACCESS_TOKEN_SECRET)"
                    .to_string(),
            ),
            "CoinGecko" => Some(
                "CoinGecko (env variables COINGECKO_API_KEY)\n\
                 curl -X GET \"https://pro-api.coingecko.com/api/v3/search/trending?x_cg_pro_api_key={COINGECKO_API_KEY}\" # To find trending coins\n\
                 curl -X GET \"https://pro-api.coingecko.com/api/v3/search?query={ASSUMED_TOKEN_SYMBOL}&x_cg_pro_api_key={COINGECKO_API_KEY}\" # To find an address given a token symbol"
                    .to_string(),
            ),
            "DuckDuckGo" => Some(
                "DuckDuckGo (command line `ddgr`) (example usage `ddgr --json x` to search for x)"
                    .to_string(),
            ),
            "Etherscan" => Some("Etherscan (env vars ETHERSCAN_API_KEY)".to_string()),
            "Infura" => Some("Infura (env vars INFURA_PROJECT_ID)".to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_map_covers_selected_services() {
        let env = services_to_envs(&["CoinGecko".to_string(), "DuckDuckGo".to_string()]);
        assert!(env.contains_key("COINGECKO_API_KEY"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn unknown_service_contributes_nothing() {
        assert!(services_to_envs(&["Clairvoyance".to_string()]).is_empty());
        assert!(services_to_prompts(&["Clairvoyance".to_string()]).is_empty());
    }

    #[test]
    fn blurbs_name_their_env_vars() {
        let blurbs = services_to_prompts(&["Twitter".to_string(), "Etherscan".to_string()]);
        assert_eq!(blurbs.len(), 2);
        assert!(blurbs[0].contains("TWITTER_API_KEY"));
        assert!(blurbs[1].contains("ETHERSCAN_API_KEY"));
    }
}
