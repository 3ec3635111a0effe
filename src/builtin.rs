pub const BUILTIN_CSS: &str = r#":root {
  color-scheme: light dark;
  --fg: #1f2328;
  --muted: #656d76;
  --line: #d0d7de;
  --bg: #ffffff;
}
@media (prefers-color-scheme: dark) {
  :root { --fg: #e6edf3; --muted: #8d96a0; --line: #30363d; --bg: #0d1117; }
}
body { margin: 0; background: var(--bg); color: var(--fg); font: 16px/1.6 system-ui, sans-serif; }
.bc-container { max-width: 860px; margin: 0 auto; padding: 24px 16px; }
.bc-meta { color: var(--muted); font-size: 0.875rem; }
.bc-post-image, .bc-comment-image { display: block; max-width: 100%; margin: 12px 0; }
.bc-comment-image { max-width: 150px; max-height: 150px; }
.bc-comments { list-style: none; padding: 0; border-top: 1px solid var(--line); }
.bc-comment { padding: 12px 0; border-bottom: 1px solid var(--line); }
.bc-replies { list-style: none; margin: 8px 0 0; padding-left: 24px; border-left: 2px solid var(--line); }
.bc-reply { padding: 8px 0; font-size: 0.9375rem; }
.bc-body p { margin: 0 0 8px; }
"#;
