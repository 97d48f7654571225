//! 提示词注册表与消息装配
//!
//! 六种提示词类型各自绑定一段系统指令与一个用户消息模板。
//! 装配是纯函数：相同输入产生逐字节相同的输出，不依赖
//! 时间与随机数。

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::chat::{ChatTurn, RelayError};
use crate::provider::ChatMessage;

// ============================================================================
// 提示词类型
// ============================================================================

/// 提示词类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// 章节总结
    Summarize,
    /// 阅读笔记
    Notes,
    /// 内容问答
    Qa,
    /// 深度解析
    Analysis,
    /// 批判性思考
    Critical,
    /// 延伸联想
    Connection,
}

impl PromptKind {
    /// 全部类型，顺序即对外展示顺序
    pub const ALL: [PromptKind; 6] = [
        PromptKind::Summarize,
        PromptKind::Notes,
        PromptKind::Qa,
        PromptKind::Analysis,
        PromptKind::Critical,
        PromptKind::Connection,
    ];

    /// 对外的字符串标识
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Summarize => "summarize",
            PromptKind::Notes => "notes",
            PromptKind::Qa => "qa",
            PromptKind::Analysis => "analysis",
            PromptKind::Critical => "critical",
            PromptKind::Connection => "connection",
        }
    }

    /// 从字符串解析，未知值返回 `None`
    pub fn parse(value: &str) -> Option<PromptKind> {
        match value {
            "summarize" => Some(PromptKind::Summarize),
            "notes" => Some(PromptKind::Notes),
            "qa" => Some(PromptKind::Qa),
            "analysis" => Some(PromptKind::Analysis),
            "critical" => Some(PromptKind::Critical),
            "connection" => Some(PromptKind::Connection),
            _ => None,
        }
    }

    /// 该类型的提示词定义
    pub fn definition(self) -> &'static PromptDefinition {
        match self {
            PromptKind::Summarize => &SUMMARIZE,
            PromptKind::Notes => &NOTES,
            PromptKind::Qa => &QA,
            PromptKind::Analysis => &ANALYSIS,
            PromptKind::Critical => &CRITICAL,
            PromptKind::Connection => &CONNECTION,
        }
    }
}

// ============================================================================
// 提示词定义
// ============================================================================

/// 一种提示词的完整定义
#[derive(Debug, Clone, Copy)]
pub struct PromptDefinition {
    /// 类型
    pub kind: PromptKind,
    /// 展示标题
    pub title: &'static str,
    /// 功能说明，用于前端菜单
    pub description: &'static str,
    /// 系统指令
    pub system_prompt: &'static str,
}

static SUMMARIZE: PromptDefinition = PromptDefinition {
    kind: PromptKind::Summarize,
    title: "章节总结",
    description: "提炼本章的核心内容与关键论点",
    system_prompt: "你是一位资深的阅读助手，擅长提炼书籍章节的核心内容。\
        请用简洁的中文总结章节：先给出一段整体概述，再分条列出关键论点或情节，\
        最后点出值得留意的细节。只依据提供的章节内容作答，不要编造。",
};

static NOTES: PromptDefinition = PromptDefinition {
    kind: PromptKind::Notes,
    title: "阅读笔记",
    description: "生成结构化的阅读笔记",
    system_prompt: "你是一位严谨的读书笔记整理者。请基于章节内容产出结构化笔记，\
        包含：核心概念及其定义、重要引文（注明大意即可）、作者的论证脉络、\
        以及两到三个便于复习的要点问题。使用中文，条理清晰。",
};

static QA: PromptDefinition = PromptDefinition {
    kind: PromptKind::Qa,
    title: "内容问答",
    description: "围绕本章内容回答读者的问题",
    system_prompt: "你是一位耐心的阅读问答助手。请仅依据提供的章节内容回答读者的问题，\
        回答使用中文，引用原文时注明出处段落的大意。若章节内容不足以回答，\
        请直接说明无法从本章得到答案，不要凭空猜测。",
};

static ANALYSIS: PromptDefinition = PromptDefinition {
    kind: PromptKind::Analysis,
    title: "深度解析",
    description: "分析本章的主题、结构与写作手法",
    system_prompt: "你是一位文本分析专家。请深入解析章节：阐明主题与立意、\
        梳理结构与行文节奏、指出修辞与写作手法，并说明这一章在全书中的作用。\
        使用中文，分析须以章节原文为依据。",
};

static CRITICAL: PromptDefinition = PromptDefinition {
    kind: PromptKind::Critical,
    title: "批判性思考",
    description: "评估本章论证的强弱与潜在偏见",
    system_prompt: "你是一位批判性阅读教练。请评估章节中的论证：指出论据的可靠程度、\
        推理中的漏洞或跳跃、可能存在的立场与偏见，并提出值得读者进一步追问的问题。\
        保持公允，使用中文。",
};

static CONNECTION: PromptDefinition = PromptDefinition {
    kind: PromptKind::Connection,
    title: "延伸联想",
    description: "将本章内容与其他知识和现实场景联系",
    system_prompt: "你是一位博学的阅读伙伴。请把章节内容与更广阔的语境联系起来：\
        相关的学科知识、历史或现实事件、其他书籍或作品中的呼应之处，\
        并说明这些联系对理解本章有什么帮助。使用中文。",
};

/// 有序的提示词注册表（类型 -> 定义），顺序与 [`PromptKind::ALL`] 一致
static REGISTRY: Lazy<IndexMap<PromptKind, &'static PromptDefinition>> =
    Lazy::new(|| PromptKind::ALL.iter().map(|k| (*k, k.definition())).collect());

/// 提示词注册表
pub fn registry() -> &'static IndexMap<PromptKind, &'static PromptDefinition> {
    &REGISTRY
}

// ============================================================================
// 消息装配
// ============================================================================

/// 装配一次聊天的系统消息与用户消息
///
/// 未知的提示词类型返回 [`RelayError::InvalidPromptType`]。
/// 会话历史不在这里处理，由中继在 qa 类型下拼接。
pub fn build_messages(turn: &ChatTurn) -> Result<(ChatMessage, ChatMessage), RelayError> {
    let kind = PromptKind::parse(&turn.prompt_type)
        .ok_or_else(|| RelayError::InvalidPromptType(turn.prompt_type.clone()))?;
    let definition = kind.definition();

    Ok((
        ChatMessage::system(definition.system_prompt),
        ChatMessage::user(format_user_prompt(kind, turn)),
    ))
}

/// 按类型把章节上下文插入用户消息模板
fn format_user_prompt(kind: PromptKind, turn: &ChatTurn) -> String {
    let context = format!(
        "书名：《{}》\n作者：{}\n出版社：{}\n简介：{}\n主题：{}\n\n\
         当前章节：{}（第 {} 章，共 {} 章）\n\n章节内容：\n{}",
        turn.book_title,
        turn.authors,
        turn.publisher,
        turn.description,
        turn.subjects,
        turn.chapter_title,
        turn.chapter_num,
        turn.total_chapters,
        turn.chapter_text,
    );

    match kind {
        PromptKind::Summarize => format!("{context}\n\n请总结这一章的内容。"),
        PromptKind::Notes => format!("{context}\n\n请为这一章整理一份结构化的阅读笔记。"),
        PromptKind::Qa => format!(
            "{context}\n\n读者的问题：{}\n\n请基于以上章节内容回答这个问题。",
            turn.question
        ),
        PromptKind::Analysis => {
            format!("{context}\n\n请深入解析这一章的主题、结构与写作手法。")
        }
        PromptKind::Critical => format!(
            "{context}\n\n请对这一章的论证做批判性评估，指出其强处与弱点。"
        ),
        PromptKind::Connection => format!(
            "{context}\n\n请把这一章的内容与更广泛的知识、现实场景或其他作品联系起来。"
        ),
    }
}

// ============================================================================
// 测试
// ============================================================================
