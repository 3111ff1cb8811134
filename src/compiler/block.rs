//! Kinds of open directive blocks and the code that closes each one

use std::fmt;

/// A directive that opened a block and waits for its closer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    If,
    Foreach,
    For,
    While,
    Forelse,
    /// A forelse after its `@else`: only the conditional is left open
    ForelseEmpty,
    Php,
    Section,
    Block,
    Push,
    Prepend,
    Trim,
}

impl Block {
    /// Generated code that closes this block
    pub fn closer(self) -> &'static str {
        match self {
            Block::If | Block::ForelseEmpty => "<?php endif ?>",
            Block::Foreach => "<?php endforeach ?>",
            Block::For => "<?php endfor ?>",
            Block::While => "<?php endwhile ?>",
            Block::Forelse => "<?php endforeach; endif ?>",
            Block::Php => "?>",
            Block::Section | Block::Block => "<?php $this->endSection() ?>",
            Block::Push => "<?php $this->endPush() ?>",
            Block::Prepend => "<?php $this->endPrepend() ?>",
            Block::Trim => "<?php $this->endTrim() ?>",
        }
    }

    /// Directive name that opens this block
    pub fn directive(self) -> &'static str {
        match self {
            Block::If => "if",
            Block::Foreach | Block::For | Block::While => "for",
            Block::Forelse | Block::ForelseEmpty => "forelse",
            Block::Php => "php",
            Block::Section => "section",
            Block::Block => "block",
            Block::Push => "push",
            Block::Prepend => "prepend",
            Block::Trim => "trim",
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.directive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forelse_closers() {
        assert_eq!(Block::Forelse.closer(), "<?php endforeach; endif ?>");
        assert_eq!(Block::ForelseEmpty.closer(), "<?php endif ?>");
    }

    #[test]
    fn test_loop_kinds_share_directive_name() {
        assert_eq!(Block::For.to_string(), "@for");
        assert_eq!(Block::While.to_string(), "@for");
        assert_eq!(Block::While.closer(), "<?php endwhile ?>");
    }
}
