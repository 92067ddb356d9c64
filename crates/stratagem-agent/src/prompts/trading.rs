use std::collections::HashMap;

use super::{build_registry, join_apis, render, PromptError};

const SYSTEM_PROMPT: &str = "\
You are a {role} crypto trader.
Today's date is {today_date}.
Your goal is to maximize {metric_name} within {time}.
You are currently at {metric_state}";

const STRATEGY_PROMPT_FIRST: &str = "\
You know nothing about your environment.
What do you do now?
You can use the following APIs to do research or run code to interact with the world :
<APIs>
{apis_str}
</APIs>
Please explain your approach.";

const STRATEGY_PROMPT: &str = "\
Here is what is going on in your environment right now : {cur_environment}.
Here is what you just tried : {prev_strategy}.
It {prev_strategy_result}.
What do you do now?
You can pursue or modify your current approach or try a new one.
You can use the following APIs to do further research or run code to interact with the world :
<APIs>
{apis_str}
</APIs>
Please explain your approach.";

const ADDRESS_RESEARCH_CODE_PROMPT: &str = "\
You are a {role} crypto trader.
Your goal is to maximize {metric_name} within {time}.
You are currently at {metric_state}
For the coins mentioned above, please generate some code to get the actual address of those tokens or the wrapped equivalent.
Use the Dexscreener API to find the token contract addresses if you do not know them.
You are to generate like the format below:
```python
from dotenv import load_dotenv
import ...

load_dotenv()

def main():
    ....

main()
```
Please generate the code, and make sure the output is short and concise, you only need to show the list of tokens and their addresses.";

const TRADING_CODE_PROMPT: &str = "\
Please write code to implement this strategy :
<Strategy>
{strategy_output}
</Strategy>
You have the following APIs :
<APIs>
{apis_str}
</APIs>
You may use the information on these contract addresses :
<AddressResearch>
{address_research}
</AddressResearch>
And you may use these local services as trading instruments to perform your task:
<TradingInstruments>
{trading_instruments_str}
</TradingInstruments>
Format the code as follows:
```python
from dotenv import load_dotenv
import ...

def main():
    ....

main()
```";

const TRADING_CODE_NON_ADDRESS_PROMPT: &str = "\
Please write code to implement this strategy :
<Strategy>
{strategy_output}
</Strategy>
You have the following APIs :
<APIs>
{apis_str}
</APIs>
And you may use these local services as trading instruments to perform your task:
<TradingInstruments>
{trading_instruments_str}
</TradingInstruments>
Format the code as follows:
```python
from dotenv import load_dotenv
import ...

def main():
    ....

main()
```";

const REGEN_CODE_PROMPT: &str = "\
Given these errors
<Errors>
{errors}
</Errors>
And the code they are from
<Code>
{previous_code}
</Code>
You are to generate code that fixes the error but doesn't stray too much from the original code, in this format.
```python
from dotenv import load_dotenv
import ...

load_dotenv()

def main():
    ....

main()
```
Please generate the code.";

const DEFAULT_APIS: &str = "\
Coingecko (env variables COINGECKO_API_KEY),
Etherscan (env variables ETHERSCAN_API_KEY),
Twitter (env variables TWITTER_API_KEY, TWITTER_API_KEY_SECRET),
DuckDuckGo (using the command line `ddgr`)";

const DEFAULTS: &[(&str, &str)] = &[
    ("system_prompt", SYSTEM_PROMPT),
    ("strategy_prompt_first", STRATEGY_PROMPT_FIRST),
    ("strategy_prompt", STRATEGY_PROMPT),
    ("address_research_code_prompt", ADDRESS_RESEARCH_CODE_PROMPT),
    ("trading_code_prompt", TRADING_CODE_PROMPT),
    (
        "trading_code_non_address_prompt",
        TRADING_CODE_NON_ADDRESS_PROMPT,
    ),
    ("regen_code_prompt", REGEN_CODE_PROMPT),
];

/// Template registry for the trading kind.
pub struct TradingPrompts {
    templates: HashMap<String, String>,
}

impl TradingPrompts {
    /// Overlay custom templates on the defaults and validate. Fails when a
    /// custom template drops or invents placeholders.
    pub fn new(custom: HashMap<String, String>) -> Result<Self, PromptError> {
        Ok(Self {
            templates: build_registry(custom, DEFAULTS)?,
        })
    }

    pub fn defaults() -> HashMap<String, String> {
        DEFAULTS
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect()
    }

    fn template(&self, name: &str) -> &str {
        // Registry construction guarantees every default name is present.
        self.templates.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn render_system(
        &self,
        role: &str,
        time: &str,
        metric_name: &str,
        metric_state: &str,
    ) -> String {
        let today_date = chrono::Local::now().format("%Y-%m-%d").to_string();
        render(
            self.template("system_prompt"),
            &[
                ("role", role),
                ("today_date", &today_date),
                ("time", time),
                ("metric_name", metric_name),
                ("metric_state", metric_state),
            ],
        )
    }

    pub fn render_strategy_first(&self, apis: &[String]) -> String {
        let apis_str = join_apis(apis, DEFAULT_APIS);
        render(
            self.template("strategy_prompt_first"),
            &[("apis_str", &apis_str)],
        )
    }

    pub fn render_strategy(
        &self,
        cur_environment: &str,
        prev_strategy: &str,
        prev_strategy_result: &str,
        apis: &[String],
    ) -> String {
        let apis_str = join_apis(apis, DEFAULT_APIS);
        render(
            self.template("strategy_prompt"),
            &[
                ("cur_environment", cur_environment),
                ("prev_strategy", prev_strategy),
                ("prev_strategy_result", prev_strategy_result),
                ("apis_str", &apis_str),
            ],
        )
    }

    pub fn render_address_research_code(
        &self,
        role: &str,
        time: &str,
        metric_name: &str,
        metric_state: &str,
    ) -> String {
        render(
            self.template("address_research_code_prompt"),
            &[
                ("role", role),
                ("time", time),
                ("metric_name", metric_name),
                ("metric_state", metric_state),
            ],
        )
    }

    pub fn render_trading_code(
        &self,
        strategy_output: &str,
        address_research: &str,
        apis: &[String],
        trading_instruments: &[String],
        agent_id: &str,
        signer_url: &str,
    ) -> Result<String, PromptError> {
        let instruments_str =
            instruments_to_curl_stubs(trading_instruments, agent_id, signer_url)?;
        let mut apis_str = join_apis(apis, DEFAULT_APIS);
        apis_str.push('\n');
        apis_str.push_str(&instruments_str);

        Ok(render(
            self.template("trading_code_prompt"),
            &[
                ("strategy_output", strategy_output),
                ("address_research", address_research),
                ("apis_str", &apis_str),
                ("trading_instruments_str", &instruments_str),
            ],
        ))
    }

    pub fn render_trading_code_non_address(
        &self,
        strategy_output: &str,
        apis: &[String],
        trading_instruments: &[String],
        agent_id: &str,
        signer_url: &str,
    ) -> Result<String, PromptError> {
        let instruments_str =
            instruments_to_curl_stubs(trading_instruments, agent_id, signer_url)?;
        let mut apis_str = join_apis(apis, DEFAULT_APIS);
        apis_str.push('\n');
        apis_str.push_str(&instruments_str);

        Ok(render(
            self.template("trading_code_non_address_prompt"),
            &[
                ("strategy_output", strategy_output),
                ("apis_str", &apis_str),
                ("trading_instruments_str", &instruments_str),
            ],
        ))
    }

    pub fn render_regen_code(&self, previous_code: &str, errors: &str) -> String {
        render(
            self.template("regen_code_prompt"),
            &[("errors", errors), ("previous_code", previous_code)],
        )
    }
}

/// Expand instrument tags into curl-shaped HTTP stubs against the signer
/// service, ready for prompt interpolation.
pub fn instruments_to_curl_stubs(
    instruments: &[String],
    agent_id: &str,
    signer_url: &str,
) -> Result<String, PromptError> {
    let mut stubs = Vec::with_capacity(instruments.len());

    for instrument in instruments {
        let stub = match instrument.as_str() {
            "spot" => format!(
                "# Spot\n\
                 curl -X POST \"http://{signer_url}/api/v1/swap\" \\\n\
                 -H \"Content-Type: application/json\" \\\n\
                 -H \"x-superior-agent-id: {agent_id}\" \\\n\
                 -d '{{\n\
                 \t\"token_in\": \"<token_in_address>\",\n\
                 \t\"token_out\": \"<token_out_address>\",\n\
                 \t\"amount_in\": \"<amount>\",\n\
                 \t\"slippage\": \"<slippage>\"\n\
                 }}'"
            ),
            "futures" => format!(
                "# Futures\n\
                 curl -X POST \"http://{signer_url}/api/v1/futures/position\" \\\n\
                 -H \"Content-Type: application/json\" \\\n\
                 -d '{{\n\
                 \t\"market\": \"<market_symbol>\",\n\
                 \t\"side\": \"<long|short>\",\n\
                 \t\"leverage\": \"<leverage_multiplier>\",\n\
                 \t\"size\": \"<position_size>\",\n\
                 \t\"stop_loss\": \"<optional_stop_loss_price>\",\n\
                 \t\"take_profit\": \"<optional_take_profit_price>\"\n\
                 }}'"
            ),
            "options" => format!(
                "# Options\n\
                 curl -X POST \"http://{signer_url}/api/v1/options/trade\" \\\n\
                 -H \"Content-Type: application/json\" \\\n\
                 -d '{{\n\
                 \t\"underlying\": \"<asset_symbol>\",\n\
                 \t\"option_type\": \"<call|put>\",\n\
                 \t\"strike_price\": \"<strike_price>\",\n\
                 \t\"expiry\": \"<expiry_timestamp>\",\n\
                 \t\"amount\": \"<contracts_amount>\",\n\
                 \t\"side\": \"<buy|sell>\"\n\
                 }}'"
            ),
            "defi" => format!(
                "# Defi\n\
                 curl -X POST \"http://{signer_url}/api/v1/defi/interact\" \\\n\
                 -H \"Content-Type: application/json\" \\\n\
                 -d '{{\n\
                 \t\"protocol\": \"<protocol_name>\",\n\
                 \t\"action\": \"<deposit|withdraw|stake|unstake>\",\n\
                 \t\"asset\": \"<asset_address>\",\n\
                 \t\"amount\": \"<amount>\",\n\
                 \t\"pool_id\": \"<optional_pool_id>\",\n\
                 \t\"slippage\": \"<slippage_tolerance>\"\n\
                 }}'"
            ),
            other => return Err(PromptError::UnknownInstrument(other.to_string())),
        };
        stubs.push(stub);
    }

    Ok(stubs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_validates() {
        assert!(TradingPrompts::new(HashMap::new()).is_ok());
        assert!(TradingPrompts::new(TradingPrompts::defaults()).is_ok());
    }

    #[test]
    fn override_with_added_placeholder_is_rejected() {
        let custom = HashMap::from([(
            "strategy_prompt_first".to_string(),
            "APIs: {apis_str} and also {surprise}".to_string(),
        )]);
        assert!(matches!(
            TradingPrompts::new(custom),
            Err(PromptError::UnexpectedPlaceholders { .. })
        ));
    }

    #[test]
    fn override_with_removed_placeholder_is_rejected() {
        let custom = HashMap::from([(
            "system_prompt".to_string(),
            "You are a {role} trader.".to_string(),
        )]);
        assert!(matches!(
            TradingPrompts::new(custom),
            Err(PromptError::MissingPlaceholders { .. })
        ));
    }

    #[test]
    fn system_prompt_binds_all_values() {
        let prompts = TradingPrompts::new(HashMap::new()).unwrap();
        let out = prompts.render_system("degen", "24h", "wallet", "{\"eth_balance\": 1.0}");
        assert!(out.contains("degen"));
        assert!(out.contains("wallet"));
        assert!(out.contains("eth_balance"));
        assert!(!out.contains("{role}"));
        assert!(!out.contains("{metric_state}"));
    }

    #[test]
    fn strategy_prompt_carries_environment_and_prior() {
        let prompts = TradingPrompts::new(HashMap::new()).unwrap();
        let out = prompts.render_strategy(
            "ETH is pumping",
            "hold stables",
            "failed",
            &["Coingecko".to_string()],
        );
        assert!(out.contains("ETH is pumping"));
        assert!(out.contains("hold stables"));
        assert!(out.contains("It failed."));
        assert!(out.contains("Coingecko"));
    }

    #[test]
    fn spot_stub_carries_agent_and_signer() {
        let out = instruments_to_curl_stubs(
            &["spot".to_string()],
            "phi",
            "signer.internal:9009",
        )
        .unwrap();
        assert!(out.contains("x-superior-agent-id: phi"));
        assert!(out.contains("signer.internal:9009/api/v1/swap"));
        assert!(out.contains("token_in"));
    }

    #[test]
    fn all_instruments_expand_and_unknown_fails() {
        let all: Vec<String> = ["spot", "futures", "options", "defi"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = instruments_to_curl_stubs(&all, "phi", "signer").unwrap();
        for marker in ["# Spot", "# Futures", "# Options", "# Defi"] {
            assert!(out.contains(marker));
        }

        let err = instruments_to_curl_stubs(&["margin".to_string()], "phi", "signer");
        assert!(matches!(err, Err(PromptError::UnknownInstrument(_))));
    }

    #[test]
    fn trading_code_prompt_includes_instrument_stubs() {
        let prompts = TradingPrompts::new(HashMap::new()).unwrap();
        let out = prompts
            .render_trading_code(
                "buy WETH",
                "{\"WETH\": \"0xC02a\"}",
                &[],
                &["spot".to_string()],
                "phi",
                "signer",
            )
            .unwrap();
        assert!(out.contains("buy WETH"));
        assert!(out.contains("0xC02a"));
        assert!(out.contains("/api/v1/swap"));
        // default API list kicks in when none are configured
        assert!(out.contains("Coingecko"));
    }
}
