use regex::Regex;
use serde::{Deserialize, Serialize};

/// 文本切片结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// 切片内容 (已去除首尾空白)
    pub content: String,
    /// 父级标题路径 (从文档根到直接父标题, 如 ["一级标题", "二级标题"])
    pub header_path: Vec<String>,
}

/// 标题栈帧
#[derive(Debug, Clone, PartialEq)]
struct HeaderFrame {
    level: usize, // 标题级别 (1 = H1, 2 = H2, etc.)
    text: String, // 标题文本
}

/// 将 Markdown 文本切分为带标题路径的切片
///
/// # 策略
/// 1. 逐行扫描，维护标题栈 (栈内级别严格递增)
/// 2. 遇到标题行先 flush 已缓冲的内容，再按级别弹栈后入栈
/// 3. 代码围栏 (```) 内的 `#` 行按普通内容处理，不会成为标题
/// 4. 超过 `max_chunk_size` 的段落按空行边界贪心重切；
///    单个超长段落不做段内切分，原样输出
///
/// # 参数
/// - `markdown`: Markdown 文本内容
/// - `max_chunk_size`: 单个切片的目标上限 (字节数)
///
/// # 返回
/// 有序切片列表，每个切片携带内容和标题路径快照。
/// 对任意输入都有定义，空文本返回空列表。
pub fn chunk_markdown(markdown: &str, max_chunk_size: usize) -> Vec<Chunk> {
    let header_re = Regex::new(r"^(#{1,6})\s+(.*)").unwrap();

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut header_stack: Vec<HeaderFrame> = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut in_code_block = false;

    // 按 '\n' 切行，不做 \r\n 归一化
    for line in markdown.split('\n') {
        // 围栏状态先翻转，标题匹配看翻转后的状态
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
        }

        match header_re.captures(line) {
            Some(caps) if !in_code_block => {
                flush(&mut buffer, &header_stack, max_chunk_size, &mut chunks);

                let level = caps[1].len();
                let text = caps[2].trim().to_string();

                // 弹出所有级别 >= 当前级别的标题 (兄弟或更深层级)
                while header_stack.last().map_or(false, |h| h.level >= level) {
                    header_stack.pop();
                }
                header_stack.push(HeaderFrame { level, text });
            }
            _ => buffer.push(line),
        }
    }

    flush(&mut buffer, &header_stack, max_chunk_size, &mut chunks);

    chunks
}

/// 把缓冲的行落盘为 0 个或多个切片，然后清空缓冲
///
/// 内容在 `max_chunk_size` 以内直接产出单个切片；超长时按空行
/// (一个或多个空白行) 切成段落后贪心合并，合并时段落间补回空行。
fn flush(
    buffer: &mut Vec<&str>,
    header_stack: &[HeaderFrame],
    max_chunk_size: usize,
    chunks: &mut Vec<Chunk>,
) {
    if buffer.is_empty() {
        return;
    }

    let full_content = buffer.join("\n").trim().to_string();
    buffer.clear();

    if full_content.is_empty() {
        return;
    }

    // 标题路径按值快照，后续栈的变化不影响已产出的切片
    let header_path: Vec<String> = header_stack.iter().map(|h| h.text.clone()).collect();

    if full_content.len() <= max_chunk_size {
        chunks.push(Chunk {
            content: full_content,
            header_path,
        });
        return;
    }

    // 超长：按空行切段落，贪心打包
    let paragraph_re = Regex::new(r"\n\s*\n").unwrap();
    let mut temp = String::new();

    for paragraph in paragraph_re.split(&full_content) {
        if !temp.is_empty() && temp.len() + 2 + paragraph.len() > max_chunk_size {
            chunks.push(Chunk {
                content: temp.trim().to_string(),
                header_path: header_path.clone(),
            });
            temp = paragraph.to_string();
        } else if temp.is_empty() {
            temp = paragraph.to_string();
        } else {
            temp.push_str("\n\n");
            temp.push_str(paragraph);
        }
    }

    if !temp.trim().is_empty() {
        chunks.push(Chunk {
            content: temp.trim().to_string(),
            header_path,
        });
    }
}
