use std::collections::HashMap;

use super::{build_registry, join_apis, render, PromptError};

const SYSTEM_PROMPT: &str = "\
You are a {role}.
Today's date is {today_date}.
Your goal is to maximize {metric_name} within {time}.
You are currently at {metric_state}.";

const RESEARCH_CODE_PROMPT_FIRST: &str = "\
You know nothing about your environment.
Please write code to research what is going on in your environment right now.
You have the following APIs:
<APIs>
{apis_str}
</APIs>
Write your code in the following format
```python
from dotenv import load_dotenv
import ...

load_dotenv()

def main():
    ....

main()
```";

const RESEARCH_CODE_PROMPT: &str = "\
You just got the following notification:
<LatestNotification>
{notifications_str}
</LatestNotification>
Here is what you just tried:
<PrevStrategy>
{prev_strategy}
</PrevStrategy>
For reference, in the past when you encountered a similar situation you reasoned as follows:
<RAG>
{rag_summary}
</RAG>
The result of this RAG was
<BeforeStrategyExecution>
{before_metric_state}
</BeforeStrategyExecution>
<AfterStrategyExecution>
{after_metric_state}
</AfterStrategyExecution>
Please write code to research anything you need to respond to your latest notification in light of this information.
Write your code in the following format
```python
from dotenv import load_dotenv
import ...

load_dotenv()

def main():
    ....

main()
```";

const STRATEGY_PROMPT: &str = "\
You just got the following notification:
<LatestNotification>
{notifications_str}
</LatestNotification>
And here is the result of the research you just ran:
<ResearchOutput>
{research_output_str}
</ResearchOutput>
Please come up with a plan to maximize {metric_name} within {time} in response to your latest notification in light of this information.
Please explain your approach.";

const MARKETING_CODE_PROMPT: &str = "\
Please write code to implement this strategy:
<Strategy>
{strategy_output}
</Strategy>
You have the following APIs:
<APIs>
{apis_str}
</APIs>
Format the code as follows:
```python
from dotenv import load_dotenv
import ...

load_dotenv()

def main():
    ....

main()
```";

const REGEN_CODE_PROMPT: &str = "\
Given these errors:
<Errors>
{errors}
</Errors>
(Note: A 403 error usually means your post is too long. Please reduce the length below 280 characters and make sure to handle any 403 errors gracefully.)
And the code they are from:
<Code>
{previous_code}
</Code>
You are to generate code that fixes the error but doesn't stray too much from the original code, in this format:
```python
from dotenv import load_dotenv
import ...

load_dotenv()

def main():
    ....

main()
```
You are to print for everything, and raise every error or unexpected behavior of the program.
Please generate the code.";

const DEFAULT_APIS: &str = "\
Twitter API v1.1:
Required env vars:
- TWITTER_API_KEY
- TWITTER_API_KEY_SECRET
- TWITTER_ACCESS_TOKEN
- TWITTER_ACCESS_TOKEN_SECRET

Example Usage:
import tweepy
import os
from dotenv import load_dotenv

def main():
    load_dotenv()

    auth = tweepy.OAuth1UserHandler(
        os.getenv(\"TWITTER_API_KEY\"),
        os.getenv(\"TWITTER_API_KEY_SECRET\"),
        os.getenv(\"TWITTER_ACCESS_TOKEN\"),
        os.getenv(\"TWITTER_ACCESS_TOKEN_SECRET\")
    )
    api = tweepy.API(auth)

    try:
        tweet = api.update_status(\"hello world\")
        print(f\"Posted: {tweet.text}\")
    except Exception as e:
        print(f\"Error posting: {str(e)}\")
        raise

if __name__ == \"__main__\":
    main()";

const DEFAULTS: &[(&str, &str)] = &[
    ("system_prompt", SYSTEM_PROMPT),
    ("research_code_prompt_first", RESEARCH_CODE_PROMPT_FIRST),
    ("research_code_prompt", RESEARCH_CODE_PROMPT),
    ("strategy_prompt", STRATEGY_PROMPT),
    ("marketing_code_prompt", MARKETING_CODE_PROMPT),
    ("regen_code_prompt", REGEN_CODE_PROMPT),
];

/// Template registry for the marketing kind.
pub struct MarketingPrompts {
    templates: HashMap<String, String>,
}

impl MarketingPrompts {
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
                ("metric_name", metric_name),
                ("time", time),
                ("metric_state", metric_state),
            ],
        )
    }

    pub fn render_research_code_first(&self, apis: &[String]) -> String {
        let apis_str = join_apis(apis, DEFAULT_APIS);
        render(
            self.template("research_code_prompt_first"),
            &[("apis_str", &apis_str)],
        )
    }

    pub fn render_research_code(
        &self,
        notifications_str: &str,
        prev_strategy: &str,
        rag_summary: &str,
        before_metric_state: &str,
        after_metric_state: &str,
    ) -> String {
        render(
            self.template("research_code_prompt"),
            &[
                ("notifications_str", notifications_str),
                ("prev_strategy", prev_strategy),
                ("rag_summary", rag_summary),
                ("before_metric_state", before_metric_state),
                ("after_metric_state", after_metric_state),
            ],
        )
    }

    pub fn render_strategy(
        &self,
        notifications_str: &str,
        research_output_str: &str,
        metric_name: &str,
        time: &str,
    ) -> String {
        render(
            self.template("strategy_prompt"),
            &[
                ("notifications_str", notifications_str),
                ("research_output_str", research_output_str),
                ("metric_name", metric_name),
                ("time", time),
            ],
        )
    }

    pub fn render_marketing_code(&self, strategy_output: &str, apis: &[String]) -> String {
        let apis_str = join_apis(apis, DEFAULT_APIS);
        render(
            self.template("marketing_code_prompt"),
            &[
                ("strategy_output", strategy_output),
                ("apis_str", &apis_str),
            ],
        )
    }

    pub fn render_regen_code(&self, previous_code: &str, errors: &str) -> String {
        render(
            self.template("regen_code_prompt"),
            &[("errors", errors), ("previous_code", previous_code)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_validates() {
        assert!(MarketingPrompts::new(HashMap::new()).is_ok());
        assert!(MarketingPrompts::new(MarketingPrompts::defaults()).is_ok());
    }

    #[test]
    fn research_prompt_carries_rag_fields() {
        let prompts = MarketingPrompts::new(HashMap::new()).unwrap();
        let out = prompts.render_research_code(
            "thread about scaling",
            "post memes",
            "post thread about L2 scaling",
            "27",
            "34",
        );
        assert!(out.contains("thread about scaling"));
        assert!(out.contains("post thread about L2 scaling"));
        assert!(out.contains("<BeforeStrategyExecution>\n27"));
        assert!(out.contains("<AfterStrategyExecution>\n34"));
    }

    #[test]
    fn strategy_prompt_binds_metric_and_time() {
        let prompts = MarketingPrompts::new(HashMap::new()).unwrap();
        let out = prompts.render_strategy("notif", "research findings", "followers", "24h");
        assert!(out.contains("maximize followers within 24h"));
        assert!(out.contains("research findings"));
    }

    #[test]
    fn marketing_code_prompt_uses_default_apis_when_empty() {
        let prompts = MarketingPrompts::new(HashMap::new()).unwrap();
        let out = prompts.render_marketing_code("post a thread", &[]);
        assert!(out.contains("post a thread"));
        assert!(out.contains("tweepy"));
    }

    #[test]
    fn custom_override_with_same_placeholders_is_accepted() {
        let custom = HashMap::from([(
            "strategy_prompt".to_string(),
            "N: {notifications_str} R: {research_output_str} goal {metric_name} in {time}"
                .to_string(),
        )]);
        let prompts = MarketingPrompts::new(custom).unwrap();
        let out = prompts.render_strategy("n", "r", "followers", "24h");
        assert_eq!(out, "N: n R: r goal followers in 24h");
    }
}
